use std::net::SocketAddr;

use anyhow::{Context, Result};

use exlog::api;
use exlog::config::Settings;
use exlog::db::Store;
use exlog::telemetry::{get_subscriber, init_subscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = get_subscriber("exlog".into(), "info".into());
    init_subscriber(subscriber)?;

    let settings = Settings::from_env()?;
    let store = Store::connect(&settings.database_url).await?;
    store.setup().await?;

    let served = run(store.clone(), &settings).await;

    store.close().await;
    tracing::info!("database closed, bye");

    served
}

async fn run(store: Store, settings: &Settings) -> Result<()> {
    let routes = api::routes(store, settings);
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));

    let (addr, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(addr, async {
            tokio::signal::ctrl_c().await.ok();
        })
        .with_context(|| format!("Failed to bind port {}", settings.port))?;

    tracing::info!(%addr, "listening");
    server.await;

    Ok(())
}
