// src/types/mod.rs - Event, action and ledger types shared across the bot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Reference to a single posted message on the platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel_id: String,
    pub message_id: String,
}

/// Core message event that flows through the moderation chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    pub message_id: String,
    pub channel_id: String,
    pub guild_id: String,
    pub author_id: String,
    #[serde(default)]
    pub author_is_bot: bool,
    pub author_account_created_at: DateTime<Utc>,
    pub content: String,
    #[serde(default)]
    pub mentioned_user_ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl MessageEvent {
    pub fn message_ref(&self) -> MessageRef {
        MessageRef {
            channel_id: self.channel_id.clone(),
            message_id: self.message_id.clone(),
        }
    }

    /// Number of different users mentioned, repeats of the same user count once
    pub fn distinct_mention_count(&self) -> usize {
        self.mentioned_user_ids
            .iter()
            .map(String::as_str)
            .collect::<HashSet<&str>>()
            .len()
    }

    /// Whole days between account creation and this message, rounded down.
    /// A creation time after the message gives a negative age.
    pub fn account_age_days(&self) -> i64 {
        (self.timestamp - self.author_account_created_at)
            .num_seconds()
            .div_euclid(86_400)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberEvent {
    pub guild_id: String,
    pub user_id: String,
    pub account_created_at: DateTime<Utc>,
}

/// Everything the external event feed can hand to the bot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BotEvent {
    Message(MessageEvent),
    MemberJoin(MemberEvent),
    MemberLeave(MemberEvent),
    /// Raised by the verification collaborator once a member passes verification
    VerificationPassed { user_id: String, channel_id: String },
    /// Raised by the achievement report form
    AchievementReported {
        user_id: String,
        channel_id: String,
        self_rating: u32,
        difficulty: u32,
    },
}

/// Outbound actions a gate can ask the platform to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationAction {
    DeleteMessage,
    TimeoutUser { duration_minutes: u64, reason: String },
    PostNotice { text: String, auto_delete_after_seconds: Option<u64> },
}

/// Persisted per-user leveling record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRecord {
    pub level: u32,
    pub xp: u64,
}

impl Default for LevelRecord {
    fn default() -> Self {
        Self { level: 1, xp: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn message(mentions: &[&str]) -> MessageEvent {
        let now = Utc::now();
        MessageEvent {
            message_id: "m1".to_string(),
            channel_id: "general".to_string(),
            guild_id: "g1".to_string(),
            author_id: "u1".to_string(),
            author_is_bot: false,
            author_account_created_at: now - Duration::days(30) - Duration::hours(5),
            content: "hello".to_string(),
            mentioned_user_ids: mentions.iter().map(|m| m.to_string()).collect(),
            timestamp: now,
        }
    }

    #[test]
    fn test_distinct_mentions() {
        assert_eq!(message(&[]).distinct_mention_count(), 0);
        assert_eq!(message(&["a", "a", "a"]).distinct_mention_count(), 1);
        assert_eq!(message(&["a", "b", "a"]).distinct_mention_count(), 2);
    }

    #[test]
    fn test_account_age_rounds_down_to_days() {
        assert_eq!(message(&[]).account_age_days(), 30);

        let mut skewed = message(&[]);
        skewed.author_account_created_at = skewed.timestamp + Duration::seconds(30);
        assert_eq!(skewed.account_age_days(), -1);

        skewed.author_account_created_at = skewed.timestamp;
        assert_eq!(skewed.account_age_days(), 0);
    }

    #[test]
    fn test_event_json_shape() {
        let json = r#"{
            "type": "verification_passed",
            "user_id": "42",
            "channel_id": "verify"
        }"#;
        let event: BotEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, BotEvent::VerificationPassed { ref user_id, .. } if user_id == "42"));
    }

    #[test]
    fn test_default_level_record() {
        assert_eq!(LevelRecord::default(), LevelRecord { level: 1, xp: 0 });
    }
}
