use async_trait::async_trait;
use log::info;

use super::{PlatformActions, PlatformResult};
use crate::types::MessageRef;

/// Platform that performs no network calls and logs every action instead.
/// Used by the binary when events are fed through stdin.
pub struct ConsolePlatform {
    name: String,
}

impl ConsolePlatform {
    pub fn new() -> Self {
        Self {
            name: "console".to_string(),
        }
    }
}

impl Default for ConsolePlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformActions for ConsolePlatform {
    async fn delete_message(&self, message: &MessageRef) -> PlatformResult {
        info!("[{}] delete message {} in #{}", self.name, message.message_id, message.channel_id);
        Ok(())
    }

    async fn timeout_user(&self, user_id: &str, duration_minutes: u64, reason: &str) -> PlatformResult {
        info!("[{}] timeout {} for {} minutes ({})", self.name, user_id, duration_minutes, reason);
        Ok(())
    }

    async fn post_notice(
        &self,
        channel_id: &str,
        text: &str,
        auto_delete_after_seconds: Option<u64>,
    ) -> PlatformResult {
        match auto_delete_after_seconds {
            Some(secs) => info!("[{}] #{}: {} (removed after {}s)", self.name, channel_id, text, secs),
            None => info!("[{}] #{}: {}", self.name, channel_id, text),
        }
        Ok(())
    }

    fn platform_name(&self) -> &str {
        &self.name
    }
}
