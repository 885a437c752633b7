use anyhow::Context;
use background_service::BackgroundService;
use chat_client::{DiscordRest, EventStream};
use database::Database;
use feed_client::TwitterClient;
use likewatch_core::AppConfig;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "likewatch=info,background_service=info,feed_client=info,chat_client=info,database=info,likewatch_core=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    tracing::info!("Starting likewatch");

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let mut db = Database::new(config.database_url.clone());
    db.connect().await.context("connecting to database")?;
    db.run_migrations().await.context("running migrations")?;

    let feed = TwitterClient::new(&config.feed_credentials).context("building feed client")?;
    let chat = DiscordRest::new(config.discord_token.clone()).context("building chat client")?;

    let service = BackgroundService::new(&config, Arc::new(feed), Arc::new(chat), Arc::new(db))
        .context("building background service")?;
    let cancel = service.cancellation_token();

    let (sender, receiver) = mpsc::channel(64);
    let stream = EventStream::new(config.discord_token.clone());
    let gateway_cancel = cancel.clone();
    let gateway = tokio::spawn(async move {
        if let Err(e) = stream.run(sender, gateway_cancel.clone()).await {
            tracing::error!("Chat gateway stopped: {}", e);
            gateway_cancel.cancel();
        }
    });

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Ctrl-C received, shutting down");
                shutdown.cancel();
            }
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    service.start(receiver).await?;
    gateway.await.context("joining chat gateway task")?;

    tracing::info!("likewatch stopped");
    Ok(())
}
