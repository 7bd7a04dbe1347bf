use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::bot::ledger::LedgerStore;
use crate::types::LevelRecord;

/// XP drawn for every accepted chat message
pub const MESSAGE_XP_RANGE: RangeInclusive<u64> = 15..=25;
pub const VERIFICATION_BONUS_XP: u64 = 100;
pub const LEADERBOARD_LIMIT_RANGE: RangeInclusive<usize> = 1..=20;

/// XP required to go from `level` to `level + 1`, `None` past `u64`
pub fn checked_xp_needed(level: u32) -> Option<u64> {
    (level as u64).checked_mul(level as u64)?.checked_mul(100)
}

/// XP required to go from `level` to `level + 1`, saturating at `u64::MAX`
pub fn xp_needed(level: u32) -> u64 {
    checked_xp_needed(level).unwrap_or(u64::MAX)
}

/// XP earned across all completed levels plus progress in the current one
pub fn total_xp(record: &LevelRecord) -> u64 {
    // 100 * sum(k^2, k = 1..level-1)
    let n = record.level as u128;
    let completed = if n == 0 { 0 } else { 100 * (n - 1) * n * (2 * n - 1) / 6 };
    u64::try_from(completed)
        .unwrap_or(u64::MAX)
        .saturating_add(record.xp)
}

/// Whether a stored record can be used as is
pub fn is_valid_record(record: &LevelRecord) -> bool {
    record.level >= 1 && checked_xp_needed(record.level).is_some()
}

/// Add XP to a record, carrying over into as many levels as it covers.
/// Returns the updated record and whether at least one level was gained.
pub fn apply_xp(record: LevelRecord, amount: u64) -> (LevelRecord, bool) {
    let mut level = record.level.max(1);
    let mut xp = record.xp.saturating_add(amount);
    let mut leveled_up = false;

    while xp >= xp_needed(level) {
        xp -= xp_needed(level);
        level += 1;
        leveled_up = true;
    }

    (LevelRecord { level, xp }, leveled_up)
}

/// Source of per-message XP draws
pub trait XpSource: Send + Sync {
    fn draw(&self, range: RangeInclusive<u64>) -> u64;
}

/// Uniform draws from the thread-local RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomXp;

impl XpSource for RandomXp {
    fn draw(&self, range: RangeInclusive<u64>) -> u64 {
        rand::rng().random_range(range)
    }
}

/// Result of a single XP grant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XpGrant {
    pub amount: u64,
    pub leveled_up: bool,
    pub new_level: u32,
    pub record: LevelRecord,
}

/// Level lookup with derived progress figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelInfo {
    pub user_id: String,
    pub level: u32,
    pub xp: u64,
    pub xp_needed: u64,
    pub xp_remaining: u64,
    /// Fraction of the current level completed, 0.0 to 1.0
    pub progress: f64,
    pub total_xp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: String,
    pub level: u32,
    pub total_xp: u64,
}

/// XP accrual and level-up detection on top of a [`LedgerStore`]
pub struct LevelingEngine {
    ledger: Arc<dyn LedgerStore>,
    xp_source: Arc<dyn XpSource>,
    /// Held across every read-modify-write of the ledger
    write_lock: Mutex<()>,
}

impl LevelingEngine {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self::with_xp_source(ledger, Arc::new(RandomXp))
    }

    pub fn with_xp_source(ledger: Arc<dyn LedgerStore>, xp_source: Arc<dyn XpSource>) -> Self {
        Self {
            ledger,
            xp_source,
            write_lock: Mutex::new(()),
        }
    }

    /// Load a record, treating unreadable or invalid data as a new user
    async fn load_or_default(&self, user_id: &str) -> LevelRecord {
        match self.ledger.load_level_record(user_id).await {
            Ok(Some(record)) if is_valid_record(&record) => record,
            Ok(Some(record)) => {
                warn!("Invalid level record for {} ({:?}), starting over", user_id, record);
                LevelRecord::default()
            }
            Ok(None) => LevelRecord::default(),
            Err(e) => {
                warn!("Failed to load level record for {}, starting over: {}", user_id, e);
                LevelRecord::default()
            }
        }
    }

    /// Add `amount` XP to a user and persist the result
    pub async fn add_xp(&self, user_id: &str, amount: u64) -> Result<XpGrant> {
        let _guard = self.write_lock.lock().await;

        let current = self.load_or_default(user_id).await;
        let (record, leveled_up) = apply_xp(current, amount);
        self.ledger.save_level_record(user_id, record).await?;

        if leveled_up {
            info!("{} reached level {} (+{} XP)", user_id, record.level, amount);
        } else {
            debug!("Added {} XP to {} ({}/{})", amount, user_id, record.xp, xp_needed(record.level));
        }

        Ok(XpGrant {
            amount,
            leveled_up,
            new_level: record.level,
            record,
        })
    }

    /// Grant a randomly drawn message reward
    pub async fn grant_message_xp(&self, user_id: &str) -> Result<XpGrant> {
        let amount = self.xp_source.draw(MESSAGE_XP_RANGE);
        self.add_xp(user_id, amount).await
    }

    /// Look up a user's level, creating the default record if they have none
    pub async fn level_info(&self, user_id: &str) -> Result<LevelInfo> {
        let record = {
            let _guard = self.write_lock.lock().await;
            match self.ledger.load_level_record(user_id).await {
                Ok(Some(record)) if is_valid_record(&record) => record,
                _ => {
                    let record = LevelRecord::default();
                    self.ledger.save_level_record(user_id, record).await?;
                    record
                }
            }
        };

        let needed = xp_needed(record.level);
        Ok(LevelInfo {
            user_id: user_id.to_string(),
            level: record.level,
            xp: record.xp,
            xp_needed: needed,
            xp_remaining: needed.saturating_sub(record.xp),
            progress: (record.xp as f64 / needed as f64).min(1.0),
            total_xp: total_xp(&record),
        })
    }

    /// All users ordered by total XP, highest first
    async fn ranked(&self) -> Result<Vec<LeaderboardEntry>> {
        let mut scores: Vec<(String, LevelRecord)> = self
            .ledger
            .all_records()
            .await?
            .into_iter()
            .map(|(user_id, record)| {
                if is_valid_record(&record) {
                    (user_id, record)
                } else {
                    (user_id, LevelRecord::default())
                }
            })
            .collect();
        scores.sort_by(|(a_id, a), (b_id, b)| {
            total_xp(b).cmp(&total_xp(a)).then_with(|| a_id.cmp(b_id))
        });

        Ok(scores
            .into_iter()
            .enumerate()
            .map(|(i, (user_id, record))| LeaderboardEntry {
                rank: i + 1,
                user_id,
                level: record.level,
                total_xp: total_xp(&record),
            })
            .collect())
    }

    /// Top `limit` users by total XP; `limit` must be between 1 and 20
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        if !LEADERBOARD_LIMIT_RANGE.contains(&limit) {
            return Err(anyhow!(
                "leaderboard limit must be between {} and {}, got {}",
                LEADERBOARD_LIMIT_RANGE.start(),
                LEADERBOARD_LIMIT_RANGE.end(),
                limit
            ));
        }

        let mut ranked = self.ranked().await?;
        ranked.truncate(limit);
        Ok(ranked)
    }

    /// 1-based position of a user and the number of ranked users
    pub async fn rank_of(&self, user_id: &str) -> Result<Option<(usize, usize)>> {
        let ranked = self.ranked().await?;
        let population = ranked.len();
        Ok(ranked
            .iter()
            .find(|entry| entry.user_id == user_id)
            .map(|entry| (entry.rank, population)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::ledger::{InMemoryLedger, JsonFileLedger};
    use tempfile::tempdir;

    struct FixedXp(u64);

    impl XpSource for FixedXp {
        fn draw(&self, _range: RangeInclusive<u64>) -> u64 {
            self.0
        }
    }

    fn engine() -> LevelingEngine {
        LevelingEngine::new(Arc::new(InMemoryLedger::new()))
    }

    #[test]
    fn test_xp_needed_is_quadratic() {
        assert_eq!(xp_needed(1), 100);
        assert_eq!(xp_needed(2), 400);
        assert_eq!(xp_needed(10), 10_000);
    }

    #[test]
    fn test_total_xp() {
        assert_eq!(total_xp(&LevelRecord { level: 1, xp: 50 }), 50);
        assert_eq!(total_xp(&LevelRecord { level: 3, xp: 10 }), 100 + 400 + 10);
    }

    #[test]
    fn test_apply_xp_carries_over_levels() {
        assert_eq!(apply_xp(LevelRecord::default(), 250), (LevelRecord { level: 2, xp: 150 }, true));
        assert_eq!(apply_xp(LevelRecord::default(), 99), (LevelRecord { level: 1, xp: 99 }, false));
        assert_eq!(apply_xp(LevelRecord::default(), 100), (LevelRecord { level: 2, xp: 0 }, true));
        // 100 + 400 + 900 = 1400 reaches level 4
        assert_eq!(apply_xp(LevelRecord::default(), 1405), (LevelRecord { level: 4, xp: 5 }, true));
    }

    #[test]
    fn test_apply_xp_keeps_invariant() {
        let mut record = LevelRecord::default();
        for amount in [0, 1, 15, 25, 99, 400, 1234, 10_000] {
            let (next, _) = apply_xp(record, amount);
            assert!(next.xp < xp_needed(next.level));
            assert_eq!(total_xp(&next), total_xp(&record) + amount);
            record = next;
        }
    }

    #[test]
    fn test_random_xp_stays_in_range() {
        let source = RandomXp;
        for _ in 0..500 {
            let xp = source.draw(MESSAGE_XP_RANGE);
            assert!((15..=25).contains(&xp));
        }
    }

    #[tokio::test]
    async fn test_add_xp_from_new_user() {
        let engine = engine();
        let grant = engine.add_xp("u1", 250).await.unwrap();

        assert!(grant.leveled_up);
        assert_eq!(grant.new_level, 2);
        assert_eq!(grant.record, LevelRecord { level: 2, xp: 150 });

        let grant = engine.add_xp("u1", 10).await.unwrap();
        assert!(!grant.leveled_up);
        assert_eq!(grant.record, LevelRecord { level: 2, xp: 160 });
    }

    #[tokio::test]
    async fn test_message_xp_uses_injected_source() {
        let engine = LevelingEngine::with_xp_source(Arc::new(InMemoryLedger::new()), Arc::new(FixedXp(20)));
        for _ in 0..5 {
            engine.grant_message_xp("u1").await.unwrap();
        }
        let info = engine.level_info("u1").await.unwrap();
        assert_eq!((info.level, info.xp), (2, 0));
    }

    #[tokio::test]
    async fn test_level_info_creates_default_record() {
        let ledger = Arc::new(InMemoryLedger::new());
        let engine = LevelingEngine::new(ledger.clone());

        let info = engine.level_info("nobody").await.unwrap();
        assert_eq!(info.level, 1);
        assert_eq!(info.xp_needed, 100);
        assert_eq!(info.xp_remaining, 100);
        assert_eq!(info.progress, 0.0);
        assert_eq!(ledger.load_level_record("nobody").await.unwrap(), Some(LevelRecord::default()));
    }

    #[tokio::test]
    async fn test_corrupt_ledger_treated_as_new_user() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("level_data.json");
        std::fs::write(&path, "garbage").unwrap();

        let engine = LevelingEngine::new(Arc::new(JsonFileLedger::new(&path)));
        let grant = engine.add_xp("u1", 30).await.unwrap();
        assert_eq!(grant.record, LevelRecord { level: 1, xp: 30 });
    }

    #[test]
    fn test_oversized_level_saturates() {
        assert_eq!(checked_xp_needed(u32::MAX), None);
        assert_eq!(xp_needed(u32::MAX), u64::MAX);
        assert_eq!(total_xp(&LevelRecord { level: u32::MAX, xp: 5 }), u64::MAX);
        assert!(!is_valid_record(&LevelRecord { level: u32::MAX, xp: 0 }));
        assert!(is_valid_record(&LevelRecord { level: 40, xp: 0 }));
    }

    #[tokio::test]
    async fn test_out_of_range_level_in_ledger_file_is_reset() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("level_data.json");
        std::fs::write(
            &path,
            r#"{"u1": {"level": 4294967295, "xp": 0}, "u2": {"level": 4294967295, "xp": 7}}"#,
        )
        .unwrap();

        let engine = Arc::new(LevelingEngine::new(Arc::new(JsonFileLedger::new(&path))));

        let spawned = Arc::clone(&engine);
        let grant = tokio::spawn(async move { spawned.add_xp("u1", 20).await })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(grant.record, LevelRecord { level: 1, xp: 20 });

        let board = engine.leaderboard(5).await.unwrap();
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].user_id, "u1");
        assert_eq!(board[0].total_xp, 20);
        assert_eq!(board[1].total_xp, 0);

        let info = engine.level_info("u2").await.unwrap();
        assert_eq!(info.level, 1);
        assert_eq!(info.xp, 0);
        assert_eq!(info.xp_needed, 100);
    }

    #[tokio::test]
    async fn test_zero_level_record_is_reset() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.save_level_record("u1", LevelRecord { level: 0, xp: 500 }).await.unwrap();

        let engine = LevelingEngine::new(ledger);
        let grant = engine.add_xp("u1", 10).await.unwrap();
        assert_eq!(grant.record, LevelRecord { level: 1, xp: 10 });
    }

    #[tokio::test]
    async fn test_leaderboard_orders_by_total_xp() {
        let engine = engine();
        engine.add_xp("low", 50).await.unwrap();
        engine.add_xp("high", 600).await.unwrap();
        engine.add_xp("mid", 120).await.unwrap();

        let board = engine.leaderboard(2).await.unwrap();
        let ids: Vec<&str> = board.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid"]);
        assert_eq!(board[0].total_xp, 600);
        assert_eq!(board[0].level, 3);

        assert_eq!(engine.rank_of("low").await.unwrap(), Some((3, 3)));
        assert_eq!(engine.rank_of("ghost").await.unwrap(), None);

        assert!(engine.leaderboard(0).await.is_err());
        assert!(engine.leaderboard(21).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_grants_are_not_lost() {
        let engine = Arc::new(engine());
        let mut handles = Vec::new();
        for _ in 0..20 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move { engine.add_xp("u1", 10).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let info = engine.level_info("u1").await.unwrap();
        assert_eq!(info.total_xp, 200);
    }
}
