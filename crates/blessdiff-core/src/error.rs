//! Error taxonomy for a comparison run.

use std::path::PathBuf;

use crate::name::ImageName;

/// Which side of a pair a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Blessed,
    Current,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Blessed => write!(f, "blessed"),
            Side::Current => write!(f, "current"),
        }
    }
}

/// Failures of the difference primitive for a single pair.
///
/// Every variant is recorded as a warning for that pair; none of them abort
/// the run.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("failed to decode {path}: {detail}")]
    Decode { path: PathBuf, detail: String },

    #[error("failed to spawn diff command '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("diff command exited with code {code}: {stderr}")]
    ExitStatus { code: i32, stderr: String },

    #[error("diff command produced no score")]
    NoScore,

    #[error("invalid score: {0}")]
    InvalidScore(f64),

    #[error("similarity computation failed: {0}")]
    Compare(String),

    #[error("comparison cancelled")]
    Cancelled,

    #[error("comparison timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("comparison worker failed: {0}")]
    Join(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run-level errors.
#[derive(Debug, thiserror::Error)]
pub enum BlessError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{name}: missing in {side}")]
    MissingCounterpart { name: ImageName, side: Side },

    #[error("{name}: diff failed: {reason}")]
    DiffPrimitiveFailure { name: ImageName, reason: String },

    #[error("{name}: artifacts not written: {reason}")]
    ArtifactPersist { name: ImageName, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlessError {
    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            BlessError::MissingCounterpart { .. }
                | BlessError::DiffPrimitiveFailure { .. }
                | BlessError::ArtifactPersist { .. }
        )
    }
}

/// Result type for blessdiff operations.
pub type Result<T> = std::result::Result<T, BlessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = BlessError::Configuration("blessed directory is empty".to_string());
        assert!(err.to_string().contains("configuration error"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_missing_counterpart_is_not_fatal() {
        let err = BlessError::MissingCounterpart {
            name: ImageName::new("button"),
            side: Side::Current,
        };
        assert_eq!(err.to_string(), "button: missing in current");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_diff_failure_message_carries_reason() {
        let err = BlessError::DiffPrimitiveFailure {
            name: ImageName::new("chart"),
            reason: DiffError::NoScore.to_string(),
        };
        assert!(err.to_string().contains("no score"));
        assert!(!err.is_fatal());
    }
}
