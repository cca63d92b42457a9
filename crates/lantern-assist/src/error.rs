use lantern_config::ConfigError;
use lantern_scheduler::Cancelled;

/// Errors surfaced by the assist services.
///
/// Shared between every caller coalesced into one backend call, hence `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssistError {
    #[error("backend request failed: {0}")]
    Backend(String),
    #[error("request was cancelled")]
    Cancelled,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AssistError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        AssistError::Backend(err.to_string())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AssistError::Cancelled)
    }
}

impl From<Cancelled> for AssistError {
    fn from(_: Cancelled) -> Self {
        AssistError::Cancelled
    }
}

impl From<ConfigError> for AssistError {
    fn from(err: ConfigError) -> Self {
        AssistError::InvalidConfig(err.to_string())
    }
}
