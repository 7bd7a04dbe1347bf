// src/config/mod.rs - Moderation and leveling settings with hot-reload support

use anyhow::Result;
use log::{debug, error, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::Duration;

pub const SETTINGS_FILE: &str = "settings.yaml";

pub const MIN_ACCOUNT_AGE_RANGE: (u32, u32) = (0, 365);
pub const MENTION_TIMEOUT_RANGE: (u64, u64) = (1, 1440);

/// Rejections raised by the administrative setters
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key} must be between {min} and {max}, got {value}")]
    OutOfRange { key: &'static str, value: i64, min: i64, max: i64 },
    #[error("'{0}' is already in the bad word list")]
    AlreadyPresent(String),
    #[error("'{0}' is not in the bad word list")]
    NotPresent(String),
    #[error("bad word must not be empty")]
    EmptyWord,
}

/// On-disk settings document. Every field has a default so partial files load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotSettings {
    #[serde(default = "default_true")]
    pub anti_spam_enabled: bool,
    #[serde(default = "default_true")]
    pub level_system_enabled: bool,
    #[serde(default = "default_true")]
    pub levelup_notifications: bool,
    #[serde(default = "default_min_account_age_days")]
    pub min_account_age_days: u32,
    /// Timeout applied by the mention gate
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,
    #[serde(default = "default_bad_words")]
    pub bad_words: Vec<String>,
    /// Operator channel for moderation failures
    #[serde(default)]
    pub log_channel_id: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_min_account_age_days() -> u32 {
    7
}

fn default_timeout_minutes() -> u64 {
    10
}

fn default_bad_words() -> Vec<String> {
    ["spam", "アホ", "バカ", "死ね", "殺す"]
        .iter()
        .map(|w| w.to_string())
        .collect()
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            anti_spam_enabled: true,
            level_system_enabled: true,
            levelup_notifications: true,
            min_account_age_days: default_min_account_age_days(),
            timeout_minutes: default_timeout_minutes(),
            bad_words: default_bad_words(),
            log_channel_id: None,
        }
    }
}

impl BotSettings {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let (min_age, max_age) = MIN_ACCOUNT_AGE_RANGE;
        if !(min_age..=max_age).contains(&self.min_account_age_days) {
            return Err(ConfigError::OutOfRange {
                key: "min_account_age_days",
                value: self.min_account_age_days as i64,
                min: min_age as i64,
                max: max_age as i64,
            });
        }

        let (min_timeout, max_timeout) = MENTION_TIMEOUT_RANGE;
        if !(min_timeout..=max_timeout).contains(&self.timeout_minutes) {
            return Err(ConfigError::OutOfRange {
                key: "timeout_minutes",
                value: self.timeout_minutes as i64,
                min: min_timeout as i64,
                max: max_timeout as i64,
            });
        }

        Ok(())
    }
}

/// Snapshot of everything the gate chain and leveling engine read per event
#[derive(Debug, Clone, PartialEq)]
pub struct ModerationPolicy {
    pub anti_spam_enabled: bool,
    pub level_system_enabled: bool,
    pub levelup_notifications_enabled: bool,
    pub min_account_age_days: u32,
    pub mention_timeout_minutes: u64,
    pub bad_words: Vec<String>,
    pub operator_channel_id: Option<String>,
}

impl From<&BotSettings> for ModerationPolicy {
    fn from(settings: &BotSettings) -> Self {
        Self {
            anti_spam_enabled: settings.anti_spam_enabled,
            level_system_enabled: settings.level_system_enabled,
            levelup_notifications_enabled: settings.levelup_notifications,
            min_account_age_days: settings.min_account_age_days,
            mention_timeout_minutes: settings.timeout_minutes,
            bad_words: settings.bad_words.clone(),
            operator_channel_id: settings.log_channel_id.clone(),
        }
    }
}

impl Default for ModerationPolicy {
    fn default() -> Self {
        Self::from(&BotSettings::default())
    }
}

/// Events broadcasted when configuration changes
#[derive(Debug, Clone)]
pub enum ConfigChangeEvent {
    SettingsUpdated { file: String },
    ValidationError { file: String, error: String },
    ReloadComplete { files_updated: Vec<String> },
}

/// Owns the settings document. Readers always get a whole snapshot;
/// writers are serialized and swap the new document in only after it is
/// validated and persisted.
#[derive(Clone)]
pub struct ConfigurationManager {
    /// Directory holding settings.yaml, `None` keeps everything in memory
    config_dir: Option<PathBuf>,

    settings: Arc<RwLock<BotSettings>>,
    write_lock: Arc<Mutex<()>>,

    /// File watchers for hot-reloading
    watchers: Arc<RwLock<Vec<RecommendedWatcher>>>,
    change_notifier: broadcast::Sender<ConfigChangeEvent>,
    last_reload: Arc<RwLock<std::time::Instant>>,
}

impl ConfigurationManager {
    /// Create a configuration manager backed by `config_dir/settings.yaml`
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        Self::build(Some(config_dir.as_ref().to_path_buf()), BotSettings::default())
    }

    /// Create a manager that never touches the filesystem
    pub fn in_memory(settings: BotSettings) -> Self {
        Self::build(None, settings)
    }

    fn build(config_dir: Option<PathBuf>, settings: BotSettings) -> Self {
        let (tx, _) = broadcast::channel(100);

        Self {
            config_dir,
            settings: Arc::new(RwLock::new(settings)),
            write_lock: Arc::new(Mutex::new(())),
            watchers: Arc::new(RwLock::new(Vec::new())),
            change_notifier: tx,
            last_reload: Arc::new(RwLock::new(std::time::Instant::now())),
        }
    }

    /// Load settings from disk (writing a default file when none exists)
    /// and start watching the directory for edits
    pub async fn initialize(&self) -> Result<()> {
        let Some(config_dir) = &self.config_dir else {
            debug!("In-memory configuration, nothing to load");
            return Ok(());
        };

        if !config_dir.exists() {
            fs::create_dir_all(config_dir).await?;
            info!("Created configuration directory: {}", config_dir.display());
        }

        let path = config_dir.join(SETTINGS_FILE);
        let mut files_loaded = Vec::new();

        if path.exists() {
            match Self::read_settings(&path).await {
                Ok(settings) => {
                    *self.settings.write().await = settings;
                    files_loaded.push(SETTINGS_FILE.to_string());
                }
                Err(e) => {
                    warn!("Failed to load {}, using defaults: {}", path.display(), e);
                    let _ = self.change_notifier.send(ConfigChangeEvent::ValidationError {
                        file: SETTINGS_FILE.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        } else {
            let defaults = self.settings.read().await.clone();
            Self::write_settings(&path, &defaults).await?;
            files_loaded.push(format!("{} (created default)", SETTINGS_FILE));
        }

        self.setup_file_watcher(config_dir).await?;

        let _ = self.change_notifier.send(ConfigChangeEvent::ReloadComplete { files_updated: files_loaded });
        info!("Configuration manager initialized from {}", config_dir.display());
        Ok(())
    }

    /// Full policy snapshot taken under one read lock
    pub async fn policy(&self) -> ModerationPolicy {
        ModerationPolicy::from(&*self.settings.read().await)
    }

    pub async fn settings(&self) -> BotSettings {
        self.settings.read().await.clone()
    }

    /// Read a single setting by its document key, falling back to `default`
    /// when the key is unknown or holds a different type
    pub async fn get_value<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let document = match serde_json::to_value(&*self.settings.read().await) {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to serialize settings: {}", e);
                return default;
            }
        };

        document
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or(default)
    }

    /// Subscribe to configuration change events
    pub fn subscribe_to_changes(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.change_notifier.subscribe()
    }

    pub async fn set_anti_spam_enabled(&self, enabled: bool) -> Result<()> {
        self.update(|s| {
            s.anti_spam_enabled = enabled;
            Ok(())
        })
        .await?;
        info!("Anti-spam {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    pub async fn set_min_account_age_days(&self, days: u32) -> Result<()> {
        self.update(|s| {
            s.min_account_age_days = days;
            Ok(())
        })
        .await?;
        info!("Minimum account age set to {} days", days);
        Ok(())
    }

    pub async fn set_mention_timeout_minutes(&self, minutes: u64) -> Result<()> {
        self.update(|s| {
            s.timeout_minutes = minutes;
            Ok(())
        })
        .await?;
        info!("Mention timeout set to {} minutes", minutes);
        Ok(())
    }

    /// Add a bad word, rejecting case-insensitive duplicates
    pub async fn add_bad_word(&self, word: &str) -> Result<()> {
        let word = word.trim().to_string();
        if word.is_empty() {
            return Err(ConfigError::EmptyWord.into());
        }
        self.update(|s| {
            let lowered = word.to_lowercase();
            if s.bad_words.iter().any(|w| w.to_lowercase() == lowered) {
                return Err(ConfigError::AlreadyPresent(word.clone()));
            }
            s.bad_words.push(word.clone());
            Ok(())
        })
        .await?;
        info!("Added bad word '{}'", word);
        Ok(())
    }

    /// Remove every case-insensitive match of `word`
    pub async fn remove_bad_word(&self, word: &str) -> Result<()> {
        let lowered = word.trim().to_lowercase();
        self.update(|s| {
            let before = s.bad_words.len();
            s.bad_words.retain(|w| w.to_lowercase() != lowered);
            if s.bad_words.len() == before {
                return Err(ConfigError::NotPresent(word.to_string()));
            }
            Ok(())
        })
        .await?;
        info!("Removed bad word '{}'", word);
        Ok(())
    }

    /// Toggle the level system and/or level-up notices. `None` leaves a flag as is.
    pub async fn set_level_system(&self, enabled: Option<bool>, notifications: Option<bool>) -> Result<()> {
        self.update(|s| {
            if let Some(enabled) = enabled {
                s.level_system_enabled = enabled;
            }
            if let Some(notifications) = notifications {
                s.levelup_notifications = notifications;
            }
            Ok(())
        })
        .await
    }

    pub async fn set_log_channel(&self, channel_id: Option<String>) -> Result<()> {
        self.update(|s| {
            s.log_channel_id = channel_id.clone();
            Ok(())
        })
        .await
    }

    /// Apply a change to a copy of the settings, validate, persist, then swap it in
    async fn update<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut BotSettings) -> std::result::Result<(), ConfigError>,
    {
        let _guard = self.write_lock.lock().await;

        let mut next = self.settings.read().await.clone();
        apply(&mut next)?;
        next.validate()?;

        if let Some(config_dir) = &self.config_dir {
            Self::write_settings(&config_dir.join(SETTINGS_FILE), &next).await?;
        }

        *self.settings.write().await = next;
        let _ = self.change_notifier.send(ConfigChangeEvent::SettingsUpdated {
            file: SETTINGS_FILE.to_string(),
        });
        Ok(())
    }

    async fn read_settings(path: &Path) -> Result<BotSettings> {
        let content = fs::read_to_string(path).await?;
        let settings: BotSettings = if content.trim().is_empty() {
            BotSettings::default()
        } else {
            serde_yaml::from_str(&content)?
        };
        settings.validate()?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    async fn write_settings(path: &Path, settings: &BotSettings) -> Result<()> {
        let content = serde_yaml::to_string(settings)?;
        let tmp_path = path.with_extension("yaml.tmp");
        fs::write(&tmp_path, content).await?;
        fs::rename(&tmp_path, path).await?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }

    async fn setup_file_watcher(&self, config_dir: &Path) -> Result<()> {
        let settings = self.settings.clone();
        let change_notifier = self.change_notifier.clone();
        let last_reload = self.last_reload.clone();

        let (tx, mut rx) = tokio::sync::mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: std::result::Result<Event, notify::Error>| {
            if let Ok(event) = res {
                if let Err(e) = tx.blocking_send(event) {
                    error!("Failed to send file watch event: {}", e);
                }
            }
        })?;

        watcher.watch(config_dir, RecursiveMode::NonRecursive)?;

        // Keep the watcher alive for the lifetime of the manager
        self.watchers.write().await.push(watcher);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    continue;
                }

                let Some(path) = event
                    .paths
                    .iter()
                    .find(|p| p.file_name().and_then(|n| n.to_str()) == Some(SETTINGS_FILE))
                    .cloned()
                else {
                    continue;
                };

                // Debounce rapid file changes
                {
                    let now = std::time::Instant::now();
                    let last = *last_reload.read().await;
                    if now.duration_since(last) < Duration::from_millis(500) {
                        continue;
                    }
                    *last_reload.write().await = now;
                }

                info!("Settings file changed, reloading...");
                match Self::read_settings(&path).await {
                    Ok(reloaded) => {
                        *settings.write().await = reloaded;
                        let _ = change_notifier.send(ConfigChangeEvent::SettingsUpdated {
                            file: SETTINGS_FILE.to_string(),
                        });
                    }
                    Err(e) => {
                        error!("Failed to reload settings, keeping previous values: {}", e);
                        let _ = change_notifier.send(ConfigChangeEvent::ValidationError {
                            file: SETTINGS_FILE.to_string(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        });

        Ok(())
    }
}
