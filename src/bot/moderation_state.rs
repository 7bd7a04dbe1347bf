use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Ephemeral per-user moderation data. Created on a user's first message and
/// kept for the lifetime of the process.
#[derive(Debug, Default, Clone)]
pub struct UserModerationState {
    /// Arrival times of recent messages, pruned to the spam window on every check
    pub recent_message_timestamps: Vec<DateTime<Utc>>,
    pub warning_count: u32,
}

/// Keyed store of [`UserModerationState`]. Each user gets their own lock, so a
/// user's gate evaluation and the platform calls it triggers run as one
/// critical section while other users proceed in parallel.
#[derive(Default)]
pub struct ModerationStateStore {
    users: RwLock<HashMap<String, Arc<Mutex<UserModerationState>>>>,
}

impl ModerationStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the state handle for a user, creating it on first use
    pub async fn entry(&self, user_id: &str) -> Arc<Mutex<UserModerationState>> {
        if let Some(state) = self.users.read().await.get(user_id) {
            return Arc::clone(state);
        }

        let mut users = self.users.write().await;
        let state = users.entry(user_id.to_string()).or_insert_with(|| {
            debug!("Tracking moderation state for {}", user_id);
            Arc::new(Mutex::new(UserModerationState::default()))
        });
        Arc::clone(state)
    }

    pub async fn warning_count(&self, user_id: &str) -> u32 {
        let state = self.users.read().await.get(user_id).cloned();
        match state {
            Some(state) => state.lock().await.warning_count,
            None => 0,
        }
    }

    /// Number of users currently carrying at least one warning
    pub async fn users_with_warnings(&self) -> usize {
        let states: Vec<_> = self.users.read().await.values().cloned().collect();
        let mut count = 0;
        for state in states {
            if state.lock().await.warning_count > 0 {
                count += 1;
            }
        }
        count
    }

    pub async fn tracked_users(&self) -> usize {
        self.users.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entry_is_created_lazily_and_shared() {
        let store = ModerationStateStore::new();
        assert_eq!(store.tracked_users().await, 0);
        assert_eq!(store.warning_count("u1").await, 0);

        let first = store.entry("u1").await;
        first.lock().await.warning_count = 2;

        let second = store.entry("u1").await;
        assert_eq!(second.lock().await.warning_count, 2);
        assert_eq!(store.tracked_users().await, 1);
    }

    #[tokio::test]
    async fn test_users_with_warnings() {
        let store = ModerationStateStore::new();
        store.entry("clean").await;
        store.entry("warned").await.lock().await.warning_count = 1;

        assert_eq!(store.users_with_warnings().await, 1);
        assert_eq!(store.warning_count("warned").await, 1);
    }
}
