// src/bot/ledger.rs - Persistence for per-user level records

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

use crate::types::LevelRecord;

/// Storage behind the leveling engine. A single record's save must either
/// land completely or not at all; the engine serializes read-modify-write.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn load_level_record(&self, user_id: &str) -> Result<Option<LevelRecord>>;

    async fn save_level_record(&self, user_id: &str, record: LevelRecord) -> Result<()>;

    async fn all_records(&self) -> Result<Vec<(String, LevelRecord)>>;
}

/// Ledger kept in one JSON object keyed by user id.
///
/// A missing, empty or malformed file reads as an empty ledger.
pub struct JsonFileLedger {
    path: PathBuf,
    io_lock: Mutex<()>,
}

impl JsonFileLedger {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            io_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, LevelRecord>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        match serde_json::from_str(&content) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!("Ledger {} is unreadable, treating it as empty: {}", self.path.display(), e);
                Ok(BTreeMap::new())
            }
        }
    }

    async fn write_all(&self, records: &BTreeMap<String, LevelRecord>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(records)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content).await?;
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for JsonFileLedger {
    async fn load_level_record(&self, user_id: &str) -> Result<Option<LevelRecord>> {
        let _guard = self.io_lock.lock().await;
        Ok(self.read_all().await?.get(user_id).copied())
    }

    async fn save_level_record(&self, user_id: &str, record: LevelRecord) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        let mut records = self.read_all().await?;
        records.insert(user_id.to_string(), record);
        self.write_all(&records).await?;
        debug!("Saved level record for {}: {:?}", user_id, record);
        Ok(())
    }

    async fn all_records(&self) -> Result<Vec<(String, LevelRecord)>> {
        let _guard = self.io_lock.lock().await;
        Ok(self.read_all().await?.into_iter().collect())
    }
}

/// Ledger that lives only as long as the process
#[derive(Default)]
pub struct InMemoryLedger {
    records: RwLock<HashMap<String, LevelRecord>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn load_level_record(&self, user_id: &str) -> Result<Option<LevelRecord>> {
        Ok(self.records.read().await.get(user_id).copied())
    }

    async fn save_level_record(&self, user_id: &str, record: LevelRecord) -> Result<()> {
        self.records.write().await.insert(user_id.to_string(), record);
        Ok(())
    }

    async fn all_records(&self) -> Result<Vec<(String, LevelRecord)>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .map(|(id, record)| (id.clone(), *record))
            .collect())
    }
}
