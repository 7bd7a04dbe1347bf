//! # GuildWarden
//!
//! Moderation and leveling core for community chat servers. Every inbound
//! message runs through an ordered chain of moderation gates; messages that
//! survive earn XP in a persisted per-user ledger.
//!
//! ## Features
//!
//! - **Gate chain**: account age, bad words, message floods and mass mentions,
//!   each able to consume a message
//! - **Escalation**: warning counters that lead to growing timeouts
//! - **Leveling**: randomized XP per message with quadratic level curve
//! - **Hot-reload configuration**: YAML settings changed by admins or on disk
//!   apply to the very next message
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use guildwarden::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(ConfigurationManager::new("config"));
//!     config.initialize().await?;
//!
//!     let ledger = Arc::new(JsonFileLedger::new("level_data.json"));
//!     let bot = ModerationBot::new(config, Arc::new(ConsolePlatform::new()), ledger);
//!
//!     let (tx, rx) = tokio::sync::mpsc::channel(64);
//!     drop(tx);
//!     bot.run(rx).await;
//!     Ok(())
//! }
//! ```

pub mod types;
pub mod platforms;
pub mod config;
pub mod bot;

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::{ModerationBot, MessageOutcome, ModerationStatus};
    pub use crate::bot::ledger::{InMemoryLedger, JsonFileLedger, LedgerStore};
    pub use crate::bot::leveling::{LevelingEngine, XpGrant, XpSource};
    pub use crate::bot::moderation::{ChainOutcome, Gate, GateOutcome, ModerationChain};
    pub use crate::config::{BotSettings, ConfigurationManager, ModerationPolicy};
    pub use crate::platforms::{
        PlatformActions, PlatformError,
        console::ConsolePlatform,
    };
    pub use crate::types::{BotEvent, LevelRecord, MessageEvent, ModerationAction};
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
