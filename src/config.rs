use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use dotenv::dotenv;

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub port: u16,
    /// Holds `index.html`, served at `/`.
    pub views_dir: PathBuf,
    pub public_dir: PathBuf,
}

impl Settings {
    /// Reads settings from the environment, loading a `.env` file first if
    /// one is present.
    pub fn from_env() -> Result<Settings> {
        dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars<F>(var: F) -> Result<Settings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = var("DATABASE_URL").context("DATABASE_URL env var must be set!")?;

        let port = match var("PORT") {
            Some(port) => port
                .parse::<u16>()
                .with_context(|| format!("PORT must be a port number, got {:?}", port))?,
            None => DEFAULT_PORT,
        };

        Ok(Settings {
            database_url,
            port,
            views_dir: var("EXLOG_VIEWS_DIR")
                .unwrap_or_else(|| "views".to_string())
                .into(),
            public_dir: var("EXLOG_PUBLIC_DIR")
                .unwrap_or_else(|| "public".to_string())
                .into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let settings = settings(&[("DATABASE_URL", "sqlite://exlog.db")])?;

        assert_eq!(settings.database_url, "sqlite://exlog.db");
        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.views_dir, PathBuf::from("views"));
        assert_eq!(settings.public_dir, PathBuf::from("public"));

        Ok(())
    }

    #[test]
    fn test_port_override() -> Result<()> {
        let settings = settings(&[("DATABASE_URL", "sqlite://exlog.db"), ("PORT", "8080")])?;
        assert_eq!(settings.port, 8080);

        Ok(())
    }

    #[test]
    fn test_missing_database_url() {
        assert!(settings(&[]).is_err());
    }

    #[test]
    fn test_bad_port() {
        assert!(settings(&[("DATABASE_URL", "sqlite://exlog.db"), ("PORT", "http")]).is_err());
    }
}
