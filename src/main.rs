mod commands;
mod config;
mod dispatcher;
mod error;
mod logging;
mod media;
mod platform;
mod recovery;
mod scheduler;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::commands::builtin::builtin_registry;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::media::MediaStore;
use crate::platform::bridge::BridgeTransport;
use crate::scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    logging::init(&config.logging)?;

    info!("Configuration loaded from: {}", config_path.display());
    info!("  Bridge: {} {:?}", config.bridge.command, config.bridge.args);
    info!("  Session: {}", config.bridge.session_path.display());
    info!("  Audit chat: {}", config.audit.chat_id);
    info!("  Media dir: {}", config.storage.media_dir.display());

    // A clashing command name is a startup failure
    let registry = Arc::new(builtin_registry(&config)?);
    info!("{} command(s) registered", registry.len());

    let media = MediaStore::new(&config.storage.media_dir, &config.storage.database_path);

    let mut scheduler = Scheduler::new().await?;
    scheduler::tasks::register_builtin_tasks(&scheduler, media.clone()).await?;
    scheduler.start().await?;

    let (transport, events) = BridgeTransport::spawn(&config.bridge).await?;

    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        media,
        transport.clone(),
        config.audit.chat_id.clone(),
    ));

    info!("Bot is starting...");
    tokio::select! {
        _ = dispatcher.run(events) => info!("Bridge closed its event stream"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }

    if let Err(e) = transport.shutdown().await {
        error!("Failed to stop bridge: {:#}", e);
    }
    scheduler.shutdown().await?;

    Ok(())
}
