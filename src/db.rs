use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

use crate::exercise::{serialize_display_date, NewExercise};
use crate::log_query::LogQuery;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct LogEntry {
    pub description: String,
    pub duration: i64,
    #[serde(serialize_with = "serialize_display_date")]
    pub date: NaiveDate,
}

/// Handle to the exercise database. Cheap to clone; every clone shares the
/// same connection pool.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(db_url: &str) -> Result<Store> {
        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("Invalid database url: {}", db_url))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .context("Failed to open database")?;

        Ok(Store { pool })
    }

    /// Creates the tables if they don't already exist.
    pub async fn setup(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        // One log per user.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS logs (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE REFERENCES users(id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS log_entries (
                id INTEGER PRIMARY KEY,
                log_id TEXT NOT NULL REFERENCES logs(id),
                description TEXT NOT NULL,
                duration INTEGER NOT NULL,
                date TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS log_entries_log_date ON log_entries(log_id, date)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn insert_user(&self, username: &str) -> Result<User> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
        };

        sqlx::query("INSERT INTO users (id, username) VALUES (?, ?)")
            .bind(&user.id)
            .bind(&user.username)
            .execute(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn read_all_users(&self) -> Result<Vec<User>> {
        Ok(
            sqlx::query_as::<_, User>("SELECT id, username FROM users ORDER BY rowid")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn read_user(&self, id: &str) -> Result<Option<User>> {
        Ok(
            sqlx::query_as::<_, User>("SELECT id, username FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Appends `exercise` to the user's log, creating the log first if this is
    /// the user's first entry. Returns `true` when the log was created.
    ///
    /// Both statements are atomic on their own and the UNIQUE constraint on
    /// `logs.user_id` decides which of several concurrent first writes gets to
    /// create the log, so no existence check is needed.
    pub async fn push_entry(&self, user_id: &str, exercise: &NewExercise) -> Result<bool> {
        let created = sqlx::query(
            "INSERT INTO logs (id, user_id) VALUES (?, ?)
            ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .execute(&self.pool)
        .await?
        .rows_affected()
            == 1;

        sqlx::query(
            "INSERT INTO log_entries (log_id, description, duration, date)
            SELECT id, ?, ?, ? FROM logs WHERE user_id = ?",
        )
        .bind(&exercise.description)
        .bind(exercise.duration)
        .bind(exercise.date)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(created)
    }

    /// A user's entries within `query.from..=query.to`, newest first, at most
    /// `query.limit` of them. Entries sharing a date keep insertion order.
    pub async fn aggregate_log(&self, user_id: &str, query: &LogQuery) -> Result<Vec<LogEntry>> {
        Ok(sqlx::query_as::<_, LogEntry>(
            "SELECT e.description, e.duration, e.date
            FROM log_entries e
            JOIN logs l ON l.id = e.log_id
            WHERE l.user_id = ? AND e.date >= ? AND e.date <= ?
            ORDER BY e.date DESC, e.id ASC
            LIMIT ?",
        )
        .bind(user_id)
        .bind(query.from)
        .bind(query.to)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?)
    }
}

/// Lookups used to check the one-log-per-user invariant from tests.
#[cfg(test)]
impl Store {
    pub async fn log_exists(&self, user_id: &str) -> Result<bool> {
        let rec: (i64,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM logs WHERE user_id = ?)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(rec.0 != 0)
    }

    pub async fn count_logs(&self, user_id: &str) -> Result<i64> {
        let rec: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM logs WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(rec.0)
    }
}
