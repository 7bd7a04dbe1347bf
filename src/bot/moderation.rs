// src/bot/moderation.rs - Ordered moderation gates with escalating consequences

use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::bot::escalation::EscalationTracker;
use crate::bot::moderation_state::{ModerationStateStore, UserModerationState};
use crate::bot::spam_detector::SpamDetector;
use crate::config::ModerationPolicy;
use crate::platforms::{PlatformActions, PlatformError};
use crate::types::{MessageEvent, ModerationAction};

/// Everything a gate may look at for one message
pub struct GateContext<'a> {
    pub message: &'a MessageEvent,
    pub policy: &'a ModerationPolicy,
}

/// What a gate decided for a message
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    Passthrough,
    Consumed(Verdict),
}

/// A consumed message and the platform actions to carry out, in order
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub gate: &'static str,
    pub reason: String,
    pub actions: Vec<ModerationAction>,
}

/// A single moderation policy check.
///
/// Gates decide synchronously and apply their state changes before returning,
/// so a later platform failure never undoes a counter increment.
pub trait Gate: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, ctx: &GateContext<'_>, state: &mut UserModerationState) -> GateOutcome;
}

fn mention(user_id: &str) -> String {
    format!("<@{}>", user_id)
}

/// Blocks accounts younger than the configured number of days. No warning is counted.
pub struct AccountAgeGate;

impl Gate for AccountAgeGate {
    fn name(&self) -> &'static str {
        "account_age"
    }

    fn evaluate(&self, ctx: &GateContext<'_>, _state: &mut UserModerationState) -> GateOutcome {
        let age_days = ctx.message.account_age_days();
        let min_days = ctx.policy.min_account_age_days as i64;
        if age_days >= min_days {
            return GateOutcome::Passthrough;
        }

        GateOutcome::Consumed(Verdict {
            gate: self.name(),
            reason: format!("account is {} days old, {} required", age_days, min_days),
            actions: vec![
                ModerationAction::DeleteMessage,
                ModerationAction::PostNotice {
                    text: format!(
                        "{} Your message was removed because accounts must be at least {} days old to post.",
                        mention(&ctx.message.author_id),
                        min_days
                    ),
                    auto_delete_after_seconds: Some(10),
                },
            ],
        })
    }
}

/// Case-insensitive substring match against the configured bad words
pub struct BadWordGate {
    escalation: EscalationTracker,
}

impl BadWordGate {
    pub fn new(escalation: EscalationTracker) -> Self {
        Self { escalation }
    }

    /// First configured word contained in `content`, ignoring case
    pub fn find_bad_word<'p>(content: &str, bad_words: &'p [String]) -> Option<&'p str> {
        let content = content.to_lowercase();
        bad_words
            .iter()
            .filter(|w| !w.is_empty())
            .find(|w| content.contains(&w.to_lowercase()))
            .map(|w| w.as_str())
    }
}

impl Gate for BadWordGate {
    fn name(&self) -> &'static str {
        "bad_word"
    }

    fn evaluate(&self, ctx: &GateContext<'_>, state: &mut UserModerationState) -> GateOutcome {
        let Some(word) = Self::find_bad_word(&ctx.message.content, &ctx.policy.bad_words) else {
            return GateOutcome::Passthrough;
        };

        let escalation = self.escalation.record_bad_word(state);
        let mut actions = vec![
            ModerationAction::DeleteMessage,
            ModerationAction::PostNotice {
                text: format!(
                    "{} Your message contained the blocked word \"{}\" and was removed. Warnings: {}/{}",
                    mention(&ctx.message.author_id),
                    word,
                    escalation.warning_count,
                    self.escalation.bad_word_warning_limit
                ),
                auto_delete_after_seconds: Some(10),
            },
        ];

        if let Some(duration_minutes) = escalation.timeout_minutes {
            actions.push(ModerationAction::TimeoutUser {
                duration_minutes,
                reason: format!(
                    "Blocked words ({} warnings)",
                    self.escalation.bad_word_warning_limit
                ),
            });
        }

        GateOutcome::Consumed(Verdict {
            gate: self.name(),
            reason: format!("blocked word \"{}\"", word),
            actions,
        })
    }
}

/// Rate limit backed by the rolling-window detector
pub struct SpamGate {
    detector: SpamDetector,
    escalation: EscalationTracker,
}

impl SpamGate {
    pub fn new(detector: SpamDetector, escalation: EscalationTracker) -> Self {
        Self { detector, escalation }
    }
}

impl Gate for SpamGate {
    fn name(&self) -> &'static str {
        "spam"
    }

    fn evaluate(&self, ctx: &GateContext<'_>, state: &mut UserModerationState) -> GateOutcome {
        if !self.detector.is_spam(state, ctx.message.timestamp) {
            return GateOutcome::Passthrough;
        }

        let escalation = self.escalation.record_spam(state);
        GateOutcome::Consumed(Verdict {
            gate: self.name(),
            reason: format!("message flood (warning {})", escalation.warning_count),
            actions: vec![
                ModerationAction::DeleteMessage,
                ModerationAction::TimeoutUser {
                    duration_minutes: escalation.timeout_minutes,
                    reason: "Automatic timeout for spamming".to_string(),
                },
                ModerationAction::PostNotice {
                    text: format!(
                        "{} was timed out for {} minutes for sending too many messages in a short time.",
                        mention(&ctx.message.author_id),
                        escalation.timeout_minutes
                    ),
                    auto_delete_after_seconds: Some(15),
                },
            ],
        })
    }
}

/// Times out anyone mentioning two or more different users in one message
pub struct MentionGate {
    max_mentions: usize,
}

impl Default for MentionGate {
    fn default() -> Self {
        Self { max_mentions: 1 }
    }
}

impl Gate for MentionGate {
    fn name(&self) -> &'static str {
        "mention"
    }

    fn evaluate(&self, ctx: &GateContext<'_>, _state: &mut UserModerationState) -> GateOutcome {
        let mentions = ctx.message.distinct_mention_count();
        if mentions <= self.max_mentions {
            return GateOutcome::Passthrough;
        }

        let minutes = ctx.policy.mention_timeout_minutes;
        GateOutcome::Consumed(Verdict {
            gate: self.name(),
            reason: format!("{} users mentioned", mentions),
            actions: vec![
                ModerationAction::TimeoutUser {
                    duration_minutes: minutes,
                    reason: "Mentioned two or more users in one message".to_string(),
                },
                ModerationAction::PostNotice {
                    text: format!(
                        "{} was timed out for {} minutes for mentioning two or more users in one message.",
                        mention(&ctx.message.author_id),
                        minutes
                    ),
                    auto_delete_after_seconds: None,
                },
                ModerationAction::DeleteMessage,
            ],
        })
    }
}

/// How the chain resolved a message
#[derive(Debug, Clone, PartialEq)]
pub enum ChainOutcome {
    /// No gate consumed the message (or anti-spam is off)
    Passthrough,
    Consumed {
        gate: &'static str,
        /// Platform actions that failed; the verdict stands regardless
        failed_actions: usize,
    },
}

impl ChainOutcome {
    pub fn is_consumed(&self) -> bool {
        matches!(self, ChainOutcome::Consumed { .. })
    }
}

/// Runs gates in order until one consumes the message
pub struct ModerationChain {
    gates: Vec<Box<dyn Gate>>,
    states: Arc<ModerationStateStore>,
}

impl ModerationChain {
    /// Account age, bad words, spam, mentions
    pub fn new(states: Arc<ModerationStateStore>) -> Self {
        let escalation = EscalationTracker::default();
        Self::with_gates(
            vec![
                Box::new(AccountAgeGate),
                Box::new(BadWordGate::new(escalation.clone())),
                Box::new(SpamGate::new(SpamDetector::default(), escalation)),
                Box::new(MentionGate::default()),
            ],
            states,
        )
    }

    pub fn with_gates(gates: Vec<Box<dyn Gate>>, states: Arc<ModerationStateStore>) -> Self {
        Self { gates, states }
    }

    pub fn gate_names(&self) -> Vec<&'static str> {
        self.gates.iter().map(|g| g.name()).collect()
    }

    /// Evaluate a message and carry out the verdict.
    ///
    /// The user's state stays locked until the platform calls finish, so
    /// counter changes and timeouts for one user happen in arrival order.
    pub async fn process(
        &self,
        message: &MessageEvent,
        policy: &ModerationPolicy,
        platform: &dyn PlatformActions,
    ) -> ChainOutcome {
        if !policy.anti_spam_enabled {
            debug!("Anti-spam disabled, skipping gates for {}", message.author_id);
            return ChainOutcome::Passthrough;
        }

        let handle = self.states.entry(&message.author_id).await;
        let mut state = handle.lock().await;

        let Some(verdict) = self.evaluate(message, policy, &mut state) else {
            return ChainOutcome::Passthrough;
        };

        info!("Message {} from {} consumed by '{}' gate: {}",
              message.message_id, message.author_id, verdict.gate, verdict.reason);

        let failed_actions = self.execute(&verdict, message, policy, platform).await;
        ChainOutcome::Consumed { gate: verdict.gate, failed_actions }
    }

    /// Decision only: the first consuming gate's verdict, if any
    pub fn evaluate(
        &self,
        message: &MessageEvent,
        policy: &ModerationPolicy,
        state: &mut UserModerationState,
    ) -> Option<Verdict> {
        let ctx = GateContext { message, policy };
        for gate in &self.gates {
            match gate.evaluate(&ctx, state) {
                GateOutcome::Passthrough => continue,
                GateOutcome::Consumed(verdict) => return Some(verdict),
            }
        }
        None
    }

    /// Carry out each action in order. Failures are reported, never propagated.
    async fn execute(
        &self,
        verdict: &Verdict,
        message: &MessageEvent,
        policy: &ModerationPolicy,
        platform: &dyn PlatformActions,
    ) -> usize {
        let mut failed = 0;

        for action in &verdict.actions {
            let result = match action {
                ModerationAction::DeleteMessage => platform.delete_message(&message.message_ref()).await,
                ModerationAction::TimeoutUser { duration_minutes, reason } => {
                    platform.timeout_user(&message.author_id, *duration_minutes, reason).await
                }
                ModerationAction::PostNotice { text, auto_delete_after_seconds } => {
                    platform.post_notice(&message.channel_id, text, *auto_delete_after_seconds).await
                }
            };

            if let Err(e) = result {
                failed += 1;
                report_failure(platform, policy, message, verdict.gate, action, &e).await;
            }
        }

        failed
    }
}

/// Tell operators an action could not be carried out
async fn report_failure(
    platform: &dyn PlatformActions,
    policy: &ModerationPolicy,
    message: &MessageEvent,
    gate: &str,
    action: &ModerationAction,
    err: &PlatformError,
) {
    if err.is_permission_denied() {
        warn!("'{}' gate could not perform {:?} for {}: {}", gate, action, message.author_id, err);
    } else {
        error!("'{}' gate action {:?} failed for {}: {}", gate, action, message.author_id, err);
    }

    let channel = policy
        .operator_channel_id
        .as_deref()
        .unwrap_or(&message.channel_id);
    let notice = format!(
        "Moderation action failed ({} gate, user {}): {}",
        gate,
        mention(&message.author_id),
        err
    );

    if let Err(e) = platform.post_notice(channel, &notice, None).await {
        error!("Failed to report moderation failure to #{}: {}", channel, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::recording::{ActionKind, RecordedAction, RecordingPlatform};
    use chrono::{DateTime, Duration, Utc};

    fn message_at(author: &str, content: &str, timestamp: DateTime<Utc>) -> MessageEvent {
        MessageEvent {
            message_id: format!("m-{}", timestamp.timestamp_millis()),
            channel_id: "general".to_string(),
            guild_id: "g1".to_string(),
            author_id: author.to_string(),
            author_is_bot: false,
            author_account_created_at: timestamp - Duration::days(365),
            content: content.to_string(),
            mentioned_user_ids: Vec::new(),
            timestamp,
        }
    }

    fn policy() -> ModerationPolicy {
        ModerationPolicy {
            bad_words: vec!["spam".to_string()],
            ..ModerationPolicy::default()
        }
    }

    fn chain() -> (ModerationChain, Arc<ModerationStateStore>) {
        let states = Arc::new(ModerationStateStore::new());
        (ModerationChain::new(Arc::clone(&states)), states)
    }

    #[test]
    fn test_gate_order() {
        let (chain, _) = chain();
        assert_eq!(chain.gate_names(), vec!["account_age", "bad_word", "spam", "mention"]);
    }

    #[test]
    fn test_find_bad_word_is_case_insensitive_first_match() {
        let words = vec!["".to_string(), "foo".to_string(), "SPAM".to_string()];
        assert_eq!(BadWordGate::find_bad_word("buy my Spam now", &words), Some("SPAM"));
        assert_eq!(BadWordGate::find_bad_word("foo spam", &words), Some("foo"));
        assert_eq!(BadWordGate::find_bad_word("clean", &words), None);
    }

    #[tokio::test]
    async fn test_young_account_is_blocked_without_warning() {
        let (chain, states) = chain();
        let platform = RecordingPlatform::new();
        let now = Utc::now();
        let mut msg = message_at("newbie", "hi there", now);
        msg.author_account_created_at = now - Duration::days(3);

        let outcome = chain.process(&msg, &policy(), &platform).await;

        assert_eq!(outcome, ChainOutcome::Consumed { gate: "account_age", failed_actions: 0 });
        assert_eq!(platform.deletes(), 1);
        assert_eq!(states.warning_count("newbie").await, 0);
        assert!(matches!(
            platform.actions()[1],
            RecordedAction::Notice { auto_delete_after_seconds: Some(10), .. }
        ));
    }

    #[tokio::test]
    async fn test_account_created_after_message_is_blocked_at_zero_minimum() {
        let (chain, _) = chain();
        let platform = RecordingPlatform::new();
        let now = Utc::now();
        let mut msg = message_at("skewed", "hi there", now);
        msg.author_account_created_at = now + Duration::seconds(5);
        let policy = ModerationPolicy {
            min_account_age_days: 0,
            ..policy()
        };

        let outcome = chain.process(&msg, &policy, &platform).await;

        assert_eq!(outcome, ChainOutcome::Consumed { gate: "account_age", failed_actions: 0 });
        assert_eq!(platform.deletes(), 1);
    }

    #[tokio::test]
    async fn test_bad_word_escalates_on_third_violation() {
        let (chain, states) = chain();
        let platform = RecordingPlatform::new();
        let base = Utc::now();

        for i in 0..2 {
            let msg = message_at("u1", "this is SPAM", base + Duration::minutes(i));
            assert!(chain.process(&msg, &policy(), &platform).await.is_consumed());
            assert_eq!(states.warning_count("u1").await, (i + 1) as u32);
        }
        assert!(platform.timeouts().is_empty());

        let msg = message_at("u1", "Spam again", base + Duration::minutes(5));
        chain.process(&msg, &policy(), &platform).await;

        assert_eq!(platform.timeouts(), vec![30]);
        assert_eq!(platform.deletes(), 3);
        assert_eq!(states.warning_count("u1").await, 0);
    }

    #[tokio::test]
    async fn test_spam_timeouts_escalate() {
        let (chain, states) = chain();
        let platform = RecordingPlatform::new();
        let base = Utc::now();

        // Seven messages in seven seconds: the 5th, 6th and 7th are spam
        for i in 0..7 {
            let msg = message_at("flooder", "hello", base + Duration::seconds(i));
            chain.process(&msg, &policy(), &platform).await;
        }

        assert_eq!(platform.timeouts(), vec![5, 10, 15]);
        assert_eq!(platform.deletes(), 3);
        assert_eq!(states.warning_count("flooder").await, 3);
    }

    #[tokio::test]
    async fn test_mentions_use_configured_timeout_and_skip_counter() {
        let (chain, states) = chain();
        let platform = RecordingPlatform::new();
        let mut policy = policy();
        policy.mention_timeout_minutes = 42;

        let mut msg = message_at("pinger", "hey you two", Utc::now());
        msg.mentioned_user_ids = vec!["a".to_string(), "b".to_string()];

        let outcome = chain.process(&msg, &policy, &platform).await;

        assert_eq!(outcome, ChainOutcome::Consumed { gate: "mention", failed_actions: 0 });
        assert_eq!(platform.timeouts(), vec![42]);
        assert_eq!(platform.deletes(), 1);
        assert_eq!(states.warning_count("pinger").await, 0);
    }

    #[tokio::test]
    async fn test_repeated_mention_of_one_user_passes() {
        let (chain, _) = chain();
        let platform = RecordingPlatform::new();
        let mut msg = message_at("pinger", "hey hey", Utc::now());
        msg.mentioned_user_ids = vec!["a".to_string(), "a".to_string()];

        assert_eq!(chain.process(&msg, &policy(), &platform).await, ChainOutcome::Passthrough);
        assert!(platform.actions().is_empty());
    }

    #[tokio::test]
    async fn test_first_consuming_gate_wins() {
        let (chain, states) = chain();
        let platform = RecordingPlatform::new();
        let mut msg = message_at("u1", "spam for @a and @b", Utc::now());
        msg.mentioned_user_ids = vec!["a".to_string(), "b".to_string()];

        let outcome = chain.process(&msg, &policy(), &platform).await;

        assert_eq!(outcome, ChainOutcome::Consumed { gate: "bad_word", failed_actions: 0 });
        assert!(platform.timeouts().is_empty());
        assert_eq!(states.warning_count("u1").await, 1);

        // The spam gate never ran, so no timestamp was recorded
        let state = states.entry("u1").await;
        assert!(state.lock().await.recent_message_timestamps.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_anti_spam_skips_all_gates() {
        let (chain, states) = chain();
        let platform = RecordingPlatform::new();
        let mut policy = policy();
        policy.anti_spam_enabled = false;

        let mut msg = message_at("u1", "SPAM", Utc::now());
        msg.author_account_created_at = msg.timestamp;
        msg.mentioned_user_ids = vec!["a".to_string(), "b".to_string()];

        assert_eq!(chain.process(&msg, &policy, &platform).await, ChainOutcome::Passthrough);
        assert!(platform.actions().is_empty());
        assert_eq!(states.tracked_users().await, 0);
    }

    #[tokio::test]
    async fn test_permission_failure_keeps_counter_and_reports() {
        let (chain, states) = chain();
        let platform = RecordingPlatform::new();
        platform.deny(ActionKind::Delete);
        let mut policy = policy();
        policy.operator_channel_id = Some("mod-log".to_string());

        let msg = message_at("u1", "spam", Utc::now());
        let outcome = chain.process(&msg, &policy, &platform).await;

        assert_eq!(outcome, ChainOutcome::Consumed { gate: "bad_word", failed_actions: 1 });
        assert_eq!(states.warning_count("u1").await, 1);

        let reports = platform.notices_in("mod-log");
        assert_eq!(reports.len(), 1);
        assert!(reports[0].contains("bad_word"));
    }

    #[tokio::test]
    async fn test_failure_report_falls_back_to_message_channel() {
        let (chain, _) = chain();
        let platform = RecordingPlatform::new();
        platform.deny(ActionKind::Timeout);

        let mut msg = message_at("pinger", "hi", Utc::now());
        msg.mentioned_user_ids = vec!["a".to_string(), "b".to_string()];
        chain.process(&msg, &policy(), &platform).await;

        let notices = platform.notices_in("general");
        assert!(notices.iter().any(|n| n.starts_with("Moderation action failed")));
        // Remaining actions still ran
        assert_eq!(platform.deletes(), 1);
    }
}
