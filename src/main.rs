use std::sync::Arc;

use anyhow::Context;
use chrono::Duration;
use clap::Parser;

use classbook::config::{normalize_prefix, Config};
use classbook::io::MediaRoot;
use classbook::store::{MemoryStore, PgStore, Store};
use classbook::{api, AppState};

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for shutdown signal: {}", err);
    }
    log::info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = Config::parse();

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.max_connections)
                .await
                .context("could not connect to the database")?;
            log::info!("Using Postgres record store");
            Arc::new(store)
        }
        None => {
            log::warn!("DATABASE_URL not set, records are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let media = MediaRoot::new(&config.media_root);
    media
        .prepare()
        .await
        .with_context(|| format!("could not prepare media root {}", config.media_root.display()))?;
    log::info!("Storing uploads under {}", media.path().display());

    let state = AppState::new(store, media, Duration::days(config.session_days));
    let app = api::router(state, &config.api_prefix);

    log::info!(
        "Starting Classbook HTTP Server on http://{}{}",
        config.listen,
        normalize_prefix(&config.api_prefix)
    );
    axum::Server::bind(&config.listen)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
