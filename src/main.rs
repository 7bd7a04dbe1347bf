use anyhow::Result;
use log::{debug, error, info, warn};
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use guildwarden::config::ConfigChangeEvent;
use guildwarden::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("Starting GuildWarden v{}", guildwarden::VERSION);

    // =================================================================
    // CONFIGURATION
    // =================================================================

    let config_dir = env::var("GUILDWARDEN_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let config_manager = Arc::new(ConfigurationManager::new(&config_dir));

    if let Err(e) = config_manager.initialize().await {
        error!("Failed to initialize configuration system: {}", e);
        return Err(e);
    }

    let mut config_changes = config_manager.subscribe_to_changes();
    tokio::spawn(async move {
        while let Ok(event) = config_changes.recv().await {
            match event {
                ConfigChangeEvent::SettingsUpdated { file } => info!("Configuration updated: {}", file),
                ConfigChangeEvent::ValidationError { file, error } => {
                    warn!("Configuration error in {}: {}", file, error)
                }
                ConfigChangeEvent::ReloadComplete { files_updated } => {
                    debug!("Configuration reload complete: {:?}", files_updated)
                }
            }
        }
    });

    // =================================================================
    // LEDGER AND BOT CORE
    // =================================================================

    let ledger_path = env::var("GUILDWARDEN_LEDGER_PATH").unwrap_or_else(|_| "level_data.json".to_string());
    let ledger: Arc<dyn LedgerStore> = Arc::new(JsonFileLedger::new(&ledger_path));
    info!("Level ledger at {}", ledger_path);

    let platform: Arc<dyn PlatformActions> = Arc::new(ConsolePlatform::new());
    let bot = ModerationBot::new(config_manager.clone(), platform, ledger);

    // =================================================================
    // EVENT FEED (newline-delimited JSON on stdin)
    // =================================================================

    let (event_tx, event_rx) = mpsc::channel::<BotEvent>(256);

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<BotEvent>(line) {
                        Ok(event) => {
                            if event_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Skipping malformed event: {}", e),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read event feed: {}", e);
                    break;
                }
            }
        }
        debug!("Event feed reader finished");
    });

    info!("Bot is running. Feed events on stdin, press Ctrl+C to stop.");

    tokio::select! {
        _ = bot.run(event_rx) => {
            info!("Event feed ended");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    let status = bot.moderation_status().await;
    info!(
        "Final moderation status: anti-spam {}, {} bad words, {} users with warnings",
        if status.anti_spam_enabled { "on" } else { "off" },
        status.bad_word_count,
        status.warned_users
    );

    info!("GuildWarden shutdown complete");
    Ok(())
}
