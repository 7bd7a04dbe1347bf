use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::ConfigurationManager;
use crate::platforms::PlatformActions;
use crate::types::{BotEvent, MessageEvent};

pub mod escalation;
pub mod ledger;
pub mod leveling;
pub mod moderation;
pub mod moderation_state;
pub mod spam_detector;

use ledger::LedgerStore;
use leveling::{LevelingEngine, XpGrant, VERIFICATION_BONUS_XP};
use moderation::{ChainOutcome, ModerationChain};
use moderation_state::ModerationStateStore;

pub const ADMIN_XP_RANGE: RangeInclusive<u64> = 1..=10_000;
pub const ACHIEVEMENT_RATING_RANGE: RangeInclusive<u32> = 1..=10;

/// How a single message was handled
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    /// Bot-authored, not processed
    Ignored,
    Consumed { gate: &'static str },
    /// Passed moderation; `xp` is set when the level system granted XP
    Accepted { xp: Option<XpGrant> },
}

/// Current moderation settings plus live warning data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationStatus {
    pub anti_spam_enabled: bool,
    pub min_account_age_days: u32,
    pub mention_timeout_minutes: u64,
    pub bad_word_count: usize,
    pub warned_users: usize,
}

/// Core bot engine: routes events through the moderation chain and the
/// leveling engine, one event at a time
pub struct ModerationBot {
    config: Arc<ConfigurationManager>,
    platform: Arc<dyn PlatformActions>,
    states: Arc<ModerationStateStore>,
    chain: ModerationChain,
    leveling: Arc<LevelingEngine>,
}

impl ModerationBot {
    pub fn new(
        config: Arc<ConfigurationManager>,
        platform: Arc<dyn PlatformActions>,
        ledger: Arc<dyn LedgerStore>,
    ) -> Self {
        Self::with_leveling(config, platform, Arc::new(LevelingEngine::new(ledger)))
    }

    pub fn with_leveling(
        config: Arc<ConfigurationManager>,
        platform: Arc<dyn PlatformActions>,
        leveling: Arc<LevelingEngine>,
    ) -> Self {
        let states = Arc::new(ModerationStateStore::new());
        Self {
            config,
            platform,
            chain: ModerationChain::new(Arc::clone(&states)),
            states,
            leveling,
        }
    }

    pub fn leveling(&self) -> &LevelingEngine {
        &self.leveling
    }

    pub fn config(&self) -> &ConfigurationManager {
        &self.config
    }

    pub fn moderation_states(&self) -> &ModerationStateStore {
        &self.states
    }

    /// Consume events in arrival order until the sender side closes
    pub async fn run(&self, mut events: mpsc::Receiver<BotEvent>) {
        info!("Event loop started on {} platform", self.platform.platform_name());
        let mut processed: u64 = 0;

        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
            processed += 1;
        }

        info!("Event feed closed after {} events", processed);
    }

    /// Handle one event. Errors are logged here and never escape.
    pub async fn handle_event(&self, event: BotEvent) {
        match event {
            BotEvent::Message(message) => {
                self.handle_message(&message).await;
            }
            BotEvent::MemberJoin(member) => {
                debug!("Member {} joined guild {}", member.user_id, member.guild_id);
            }
            BotEvent::MemberLeave(member) => {
                debug!("Member {} left guild {}", member.user_id, member.guild_id);
            }
            BotEvent::VerificationPassed { user_id, channel_id } => {
                if let Err(e) = self.grant_verification_bonus(&user_id, &channel_id).await {
                    error!("Verification bonus for {} failed: {}", user_id, e);
                }
            }
            BotEvent::AchievementReported { user_id, channel_id, self_rating, difficulty } => {
                if let Err(e) = self
                    .grant_achievement_bonus(&user_id, &channel_id, self_rating, difficulty)
                    .await
                {
                    error!("Achievement bonus for {} failed: {}", user_id, e);
                }
            }
        }
    }

    /// Run a message through moderation and, if it survives, XP accrual
    pub async fn handle_message(&self, message: &MessageEvent) -> MessageOutcome {
        if message.author_is_bot {
            return MessageOutcome::Ignored;
        }

        let policy = self.config.policy().await;

        if let ChainOutcome::Consumed { gate, failed_actions } =
            self.chain.process(message, &policy, self.platform.as_ref()).await
        {
            if failed_actions > 0 {
                warn!("{} of the '{}' gate actions failed for message {}",
                      failed_actions, gate, message.message_id);
            }
            return MessageOutcome::Consumed { gate };
        }

        if !policy.level_system_enabled {
            return MessageOutcome::Accepted { xp: None };
        }

        match self.leveling.grant_message_xp(&message.author_id).await {
            Ok(grant) => {
                if grant.leveled_up && policy.levelup_notifications_enabled {
                    self.announce_level_up(&message.author_id, &message.channel_id, grant.new_level)
                        .await;
                }
                MessageOutcome::Accepted { xp: Some(grant) }
            }
            Err(e) => {
                error!("Failed to grant message XP to {}: {}", message.author_id, e);
                MessageOutcome::Accepted { xp: None }
            }
        }
    }

    /// Fixed reward for passing verification. Returns `None` when the level
    /// system is disabled.
    pub async fn grant_verification_bonus(&self, user_id: &str, channel_id: &str) -> Result<Option<XpGrant>> {
        self.grant_bonus(user_id, channel_id, VERIFICATION_BONUS_XP, "verification").await
    }

    /// Reward for an achievement report, scaled by its self rating and difficulty
    pub async fn grant_achievement_bonus(
        &self,
        user_id: &str,
        channel_id: &str,
        self_rating: u32,
        difficulty: u32,
    ) -> Result<Option<XpGrant>> {
        for (name, value) in [("self rating", self_rating), ("difficulty", difficulty)] {
            if !ACHIEVEMENT_RATING_RANGE.contains(&value) {
                return Err(anyhow!(
                    "{} must be between {} and {}, got {}",
                    name,
                    ACHIEVEMENT_RATING_RANGE.start(),
                    ACHIEVEMENT_RATING_RANGE.end(),
                    value
                ));
            }
        }

        let amount = self_rating as u64 * 10 + difficulty as u64 * 5;
        self.grant_bonus(user_id, channel_id, amount, "achievement").await
    }

    async fn grant_bonus(
        &self,
        user_id: &str,
        channel_id: &str,
        amount: u64,
        reason: &str,
    ) -> Result<Option<XpGrant>> {
        let policy = self.config.policy().await;
        if !policy.level_system_enabled {
            debug!("Level system disabled, skipping {} bonus for {}", reason, user_id);
            return Ok(None);
        }

        let grant = self.leveling.add_xp(user_id, amount).await?;
        info!("Granted {} bonus of {} XP to {}", reason, amount, user_id);

        if grant.leveled_up && policy.levelup_notifications_enabled {
            self.announce_level_up(user_id, channel_id, grant.new_level).await;
        }
        Ok(Some(grant))
    }

    /// Administrator XP grant, applied even when the level system is off
    pub async fn admin_grant_xp(&self, user_id: &str, amount: u64) -> Result<XpGrant> {
        if !ADMIN_XP_RANGE.contains(&amount) {
            return Err(anyhow!(
                "XP amount must be between {} and {}, got {}",
                ADMIN_XP_RANGE.start(),
                ADMIN_XP_RANGE.end(),
                amount
            ));
        }

        let grant = self.leveling.add_xp(user_id, amount).await?;
        info!("Admin granted {} XP to {}", amount, user_id);
        Ok(grant)
    }

    pub async fn moderation_status(&self) -> ModerationStatus {
        let policy = self.config.policy().await;
        ModerationStatus {
            anti_spam_enabled: policy.anti_spam_enabled,
            min_account_age_days: policy.min_account_age_days,
            mention_timeout_minutes: policy.mention_timeout_minutes,
            bad_word_count: policy.bad_words.len(),
            warned_users: self.states.users_with_warnings().await,
        }
    }

    async fn announce_level_up(&self, user_id: &str, channel_id: &str, level: u32) {
        let text = format!("🎉 <@{}> reached level **{}**!", user_id, level);
        if let Err(e) = self.platform.post_notice(channel_id, &text, None).await {
            warn!("Failed to announce level up for {}: {}", user_id, e);
        }
    }
}
