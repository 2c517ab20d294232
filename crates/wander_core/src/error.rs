use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the data and enrichment resolution layer.
///
/// Only [`WanderError::StoreCorrupt`] is meant to reach the UI as a failure.
/// Everything else is recovered inside a resolution chain by falling through
/// to the next tier, or turned into an "unresolved" outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WanderError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Local store failure: {0}")]
    StoreCorrupt(String),

    #[error("Inference unavailable: {0}")]
    InferenceUnavailable(String),

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout {
        operation: &'static str,
        after_ms: u64,
    },
}

/// Broad classification used for log fields and UI routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Expected absence of data.
    Missing,
    /// Network or remote-service failure.
    NetworkError,
    /// Local persistence failure.
    StorageError,
    /// Local or remote model produced nothing usable.
    InferenceError,
}

impl WanderError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::SourceUnavailable(message.into())
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::StoreCorrupt(err.to_string())
    }

    pub fn timeout(operation: &'static str, after: std::time::Duration) -> Self {
        Self::Timeout {
            operation,
            after_ms: after.as_millis() as u64,
        }
    }

    /// Whether a resolution chain may swallow this error and try the next tier.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::StoreCorrupt(_))
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::Missing,
            Self::SourceUnavailable(_) | Self::Timeout { .. } => ErrorCategory::NetworkError,
            Self::StoreCorrupt(_) => ErrorCategory::StorageError,
            Self::InferenceUnavailable(_) => ErrorCategory::InferenceError,
        }
    }

    /// Neutral text safe to show in the UI. Transport details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { .. } | Self::SourceUnavailable(_) | Self::Timeout { .. } => {
                "No data available yet.".into()
            }
            Self::StoreCorrupt(_) => {
                "Saved travel data could not be read. Try clearing the offline cache.".into()
            }
            Self::InferenceUnavailable(_) => "Answers are unavailable right now.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn only_store_corruption_is_fatal() {
        assert!(WanderError::not_found("destination", "x").is_recoverable());
        assert!(WanderError::unavailable("offline").is_recoverable());
        assert!(WanderError::timeout("probe", Duration::from_secs(1)).is_recoverable());
        assert!(WanderError::InferenceUnavailable("empty".into()).is_recoverable());
        assert!(!WanderError::store("disk I/O error").is_recoverable());
    }

    #[test]
    fn timeout_is_a_network_error() {
        let err = WanderError::timeout("remote store get", Duration::from_millis(1500));
        assert_eq!(err.category(), ErrorCategory::NetworkError);
        assert_eq!(err.to_string(), "remote store get timed out after 1500ms");
    }

    #[test]
    fn user_message_hides_transport_details() {
        let err = WanderError::unavailable("dns error: failed to lookup firestore.googleapis.com");
        let msg = err.user_message();
        assert!(!msg.contains("dns"));
        assert_eq!(msg, "No data available yet.");
    }

    #[test]
    fn store_corruption_is_visible() {
        let msg = WanderError::store("malformed JSON").user_message();
        assert!(msg.contains("could not be read"));
    }
}
