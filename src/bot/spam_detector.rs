use chrono::{DateTime, Duration, Utc};

use crate::bot::moderation_state::UserModerationState;

/// Rolling-window message rate check
#[derive(Debug, Clone)]
pub struct SpamDetector {
    window: Duration,
    /// Messages already in the window at which the next one counts as spam
    max_recent: usize,
}

impl Default for SpamDetector {
    fn default() -> Self {
        Self {
            window: Duration::seconds(10),
            max_recent: 4,
        }
    }
}

impl SpamDetector {
    pub fn new(window: Duration, max_recent: usize) -> Self {
        Self { window, max_recent }
    }

    /// Record a message at `now` and report whether it is spam.
    ///
    /// Timestamps older than the window are dropped before counting, so the
    /// stored sequence never grows beyond what the window can hold.
    pub fn is_spam(&self, state: &mut UserModerationState, now: DateTime<Utc>) -> bool {
        state
            .recent_message_timestamps
            .retain(|t| now.signed_duration_since(*t) < self.window);

        let recent_count = state.recent_message_timestamps.len();
        state.recent_message_timestamps.push(now);

        recent_count >= self.max_recent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: DateTime<Utc>, millis: i64) -> DateTime<Utc> {
        base + Duration::milliseconds(millis)
    }

    #[test]
    fn test_first_message_is_never_spam() {
        let detector = SpamDetector::default();
        let mut state = UserModerationState::default();
        assert!(!detector.is_spam(&mut state, Utc::now()));
        assert_eq!(state.recent_message_timestamps.len(), 1);
    }

    #[test]
    fn test_fifth_message_in_window_is_spam() {
        let detector = SpamDetector::default();
        let mut state = UserModerationState::default();
        let base = Utc::now();

        let verdicts: Vec<bool> = (0..7)
            .map(|i| detector.is_spam(&mut state, at(base, i * 1000)))
            .collect();

        assert_eq!(verdicts, vec![false, false, false, false, true, true, true]);
    }

    #[test]
    fn test_spaced_messages_are_not_spam() {
        let detector = SpamDetector::default();
        let mut state = UserModerationState::default();
        let base = Utc::now();

        // One message every 2.5 seconds keeps at most 3 others inside 10s
        for i in 0..20 {
            assert!(!detector.is_spam(&mut state, at(base, i * 2500)));
        }
    }

    #[test]
    fn test_window_boundary_is_exclusive() {
        let detector = SpamDetector::default();
        let mut state = UserModerationState::default();
        let base = Utc::now();

        for i in 0..4 {
            detector.is_spam(&mut state, at(base, i));
        }
        // Exactly 10s after the first message: the first one has aged out
        assert!(!detector.is_spam(&mut state, at(base, 10_000)));
    }

    #[test]
    fn test_old_entries_are_pruned() {
        let detector = SpamDetector::default();
        let mut state = UserModerationState::default();
        let base = Utc::now();

        for i in 0..4 {
            detector.is_spam(&mut state, at(base, i * 100));
        }
        detector.is_spam(&mut state, at(base, 60_000));
        assert_eq!(state.recent_message_timestamps, vec![at(base, 60_000)]);
    }
}
