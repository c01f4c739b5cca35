use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad error category used for caller-facing handling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionErrorCategory {
    /// Invalid input or unusable configuration value.
    Config,
    /// Operation not allowed in the current session or recorder state.
    InvalidState,
    /// Referenced message or entity is unknown to the collaborator.
    NotFound,
    /// A platform resource (recorder, storage) could not be obtained.
    ResourceUnavailable,
    /// Outgoing message enqueue or edit failed.
    Dispatch,
    /// Internal bug or broken invariant.
    Internal,
}

/// Stable session error payload emitted across the command/event boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct SessionError {
    /// High-level error category.
    pub category: SessionErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl SessionError {
    /// Construct a new session error.
    pub fn new(
        category: SessionErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build a standard invalid-state-transition error.
    pub fn invalid_state(current: impl fmt::Debug, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            SessionErrorCategory::InvalidState,
            "invalid_state_transition",
            format!("cannot run '{action}' while in state {current:?}"),
        )
    }

    /// Build a configuration error for an unparsable or out-of-range value.
    pub fn config(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(SessionErrorCategory::Config, code, message)
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        let what = what.into();
        Self::new(
            SessionErrorCategory::NotFound,
            "not_found",
            format!("{what} was not found"),
        )
    }

    pub fn resource_unavailable(resource: &str, message: impl Into<String>) -> Self {
        Self::new(
            SessionErrorCategory::ResourceUnavailable,
            format!("{resource}_unavailable"),
            message,
        )
    }

    pub fn dispatch_failed(message: impl Into<String>) -> Self {
        Self::new(SessionErrorCategory::Dispatch, "dispatch_failed", message)
    }

    /// Whether the caller may reasonably retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category,
            SessionErrorCategory::ResourceUnavailable | SessionErrorCategory::Dispatch
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::MediaRecordingState;

    #[test]
    fn keeps_invalid_state_error_code_stable() {
        let err = SessionError::invalid_state(MediaRecordingState::Idle, "lock_recording");
        assert_eq!(err.code, "invalid_state_transition");
        assert_eq!(err.category, SessionErrorCategory::InvalidState);
        assert!(err.message.contains("lock_recording"));
        assert!(err.message.contains("Idle"));
    }

    #[test]
    fn display_includes_category_and_code() {
        let err = SessionError::new(SessionErrorCategory::Dispatch, "send_failed", "offline");
        assert_eq!(err.to_string(), "Dispatch:send_failed: offline");
    }

    #[test]
    fn only_transient_categories_are_retryable() {
        let busy = SessionError::resource_unavailable("recorder", "microphone busy");
        assert_eq!(busy.code, "recorder_unavailable");
        assert!(busy.is_retryable());
        assert!(!SessionError::config("bad_value", "nope").is_retryable());
    }
}
