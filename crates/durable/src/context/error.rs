//! Step error types

use crate::persistence::StoreError;

/// Errors surfaced by durable context operations
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// The step function failed
    ///
    /// The failure is recorded, so a replay of the run returns the same
    /// error without invoking the function again.
    #[error("step {step} failed: {message}")]
    Failed { step: String, message: String },

    /// The step result could not be converted to or from JSON
    #[error("step {step} result serialization failed: {message}")]
    Serialization { step: String, message: String },

    /// An external actor rejected the awakeable
    #[error("awakeable {awakeable_id} was rejected: {reason}")]
    AwakeableRejected {
        awakeable_id: String,
        reason: String,
    },

    /// The journal store failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl StepError {
    /// Create a step failure
    pub fn failed(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Create a serialization failure
    pub fn serialization(step: impl Into<String>, error: serde_json::Error) -> Self {
        Self::Serialization {
            step: step.into(),
            message: error.to_string(),
        }
    }

    /// Check whether the error came from the step function itself
    pub fn is_step_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_failure_message() {
        let error = StepError::failed("fetch_history#0", "connection refused");
        assert_eq!(
            error.to_string(),
            "step fetch_history#0 failed: connection refused"
        );
        assert!(error.is_step_failure());
    }

    #[test]
    fn test_store_error_conversion() {
        let error: StepError = StoreError::RunNotFound("run-1".into()).into();
        assert!(matches!(error, StepError::Store(StoreError::RunNotFound(_))));
        assert!(!error.is_step_failure());
    }
}
