// src/platforms/recording.rs - In-memory platform that records outbound actions

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

use super::{PlatformActions, PlatformError, PlatformResult};
use crate::types::MessageRef;

/// One outbound call as seen by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedAction {
    Delete { channel_id: String, message_id: String },
    Timeout { user_id: String, duration_minutes: u64, reason: String },
    Notice { channel_id: String, text: String, auto_delete_after_seconds: Option<u64> },
}

/// Which kind of call to refuse with `PermissionDenied`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Delete,
    Timeout,
    Notice,
}

/// Platform that keeps every call in order. Denied calls are recorded too,
/// so callers can assert what was attempted.
#[derive(Default)]
pub struct RecordingPlatform {
    actions: Mutex<Vec<RecordedAction>>,
    denied: Mutex<HashSet<ActionKind>>,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every future call of this kind
    pub fn deny(&self, kind: ActionKind) {
        if let Ok(mut denied) = self.denied.lock() {
            denied.insert(kind);
        }
    }

    pub fn actions(&self) -> Vec<RecordedAction> {
        self.actions.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn timeouts(&self) -> Vec<u64> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                RecordedAction::Timeout { duration_minutes, .. } => Some(duration_minutes),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> usize {
        self.actions()
            .iter()
            .filter(|a| matches!(a, RecordedAction::Delete { .. }))
            .count()
    }

    pub fn notices_in(&self, channel: &str) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                RecordedAction::Notice { channel_id, text, .. } if channel_id == channel => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut actions) = self.actions.lock() {
            actions.clear();
        }
    }

    fn record(&self, kind: ActionKind, action: RecordedAction) -> PlatformResult {
        if let Ok(mut actions) = self.actions.lock() {
            actions.push(action);
        }
        let denied = self.denied.lock().map(|d| d.contains(&kind)).unwrap_or(false);
        if denied {
            return Err(PlatformError::PermissionDenied {
                action: format!("{:?}", kind).to_lowercase(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformActions for RecordingPlatform {
    async fn delete_message(&self, message: &MessageRef) -> PlatformResult {
        self.record(
            ActionKind::Delete,
            RecordedAction::Delete {
                channel_id: message.channel_id.clone(),
                message_id: message.message_id.clone(),
            },
        )
    }

    async fn timeout_user(&self, user_id: &str, duration_minutes: u64, reason: &str) -> PlatformResult {
        self.record(
            ActionKind::Timeout,
            RecordedAction::Timeout {
                user_id: user_id.to_string(),
                duration_minutes,
                reason: reason.to_string(),
            },
        )
    }

    async fn post_notice(
        &self,
        channel_id: &str,
        text: &str,
        auto_delete_after_seconds: Option<u64>,
    ) -> PlatformResult {
        self.record(
            ActionKind::Notice,
            RecordedAction::Notice {
                channel_id: channel_id.to_string(),
                text: text.to_string(),
                auto_delete_after_seconds,
            },
        )
    }

    fn platform_name(&self) -> &str {
        "recording"
    }
}
