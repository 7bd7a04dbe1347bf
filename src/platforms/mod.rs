use async_trait::async_trait;
use thiserror::Error;

use crate::types::MessageRef;

pub mod console;
pub mod recording;

/// Failures reported by the chat platform for an outbound action
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("permission denied for {action}")]
    PermissionDenied { action: String },
    #[error("{what} not found")]
    NotFound { what: String },
    #[error("transport error: {0}")]
    Transport(String),
}

impl PlatformError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, PlatformError::PermissionDenied { .. })
    }
}

pub type PlatformResult = std::result::Result<(), PlatformError>;

/// Trait defining the outbound actions the moderation core needs from a platform
#[async_trait]
pub trait PlatformActions: Send + Sync {
    /// Delete a posted message
    async fn delete_message(&self, message: &MessageRef) -> PlatformResult;

    /// Prevent a user from talking for the given number of minutes
    async fn timeout_user(&self, user_id: &str, duration_minutes: u64, reason: &str) -> PlatformResult;

    /// Post a notice in a channel, optionally removing it again after a delay
    async fn post_notice(
        &self,
        channel_id: &str,
        text: &str,
        auto_delete_after_seconds: Option<u64>,
    ) -> PlatformResult;

    /// Get the platform identifier
    fn platform_name(&self) -> &str;
}
