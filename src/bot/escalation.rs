use log::debug;

use crate::bot::moderation_state::UserModerationState;

/// Escalation rules driven by a user's warning counter
#[derive(Debug, Clone)]
pub struct EscalationTracker {
    /// Bad-word warnings that trigger a timeout
    pub bad_word_warning_limit: u32,
    pub bad_word_timeout_minutes: u64,
    /// Spam timeouts last this many minutes per accumulated warning
    pub spam_timeout_step_minutes: u64,
}

impl Default for EscalationTracker {
    fn default() -> Self {
        Self {
            bad_word_warning_limit: 3,
            bad_word_timeout_minutes: 30,
            spam_timeout_step_minutes: 5,
        }
    }
}

/// Result of recording a bad-word violation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadWordEscalation {
    /// Counter value after this violation, before any reset
    pub warning_count: u32,
    pub timeout_minutes: Option<u64>,
}

/// Result of recording a spam violation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpamEscalation {
    pub warning_count: u32,
    pub timeout_minutes: u64,
}

impl EscalationTracker {
    /// Count a bad-word violation. Reaching the limit issues a fixed timeout
    /// and clears the counter.
    pub fn record_bad_word(&self, state: &mut UserModerationState) -> BadWordEscalation {
        state.warning_count = state.warning_count.saturating_add(1);
        let warning_count = state.warning_count;

        let timeout_minutes = if warning_count >= self.bad_word_warning_limit {
            state.warning_count = 0;
            Some(self.bad_word_timeout_minutes)
        } else {
            None
        };

        debug!("Bad word warning {}/{} (timeout: {:?})",
               warning_count, self.bad_word_warning_limit, timeout_minutes);

        BadWordEscalation { warning_count, timeout_minutes }
    }

    /// Count a spam violation. The timeout grows with the counter, which is
    /// never reset here.
    pub fn record_spam(&self, state: &mut UserModerationState) -> SpamEscalation {
        state.warning_count = state.warning_count.saturating_add(1);
        let warning_count = state.warning_count;
        let timeout_minutes = self.spam_timeout_step_minutes.saturating_mul(warning_count as u64);

        debug!("Spam warning {} -> {} minute timeout", warning_count, timeout_minutes);

        SpamEscalation { warning_count, timeout_minutes }
    }
}
