//! Engine error types.

use crate::action::ActionError;
use thiserror::Error;

/// Errors from the state machine engine.
///
/// None of these are retried or recovered internally: every failure aborts
/// the in-progress traversal step and is returned to the `start` caller,
/// with the current-state pointer left at the last successfully entered
/// state. Callers inspect `current_state` to learn where the traversal
/// halted and decide whether to resume, reset, or abort.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("duplicate state: {id}")]
    DuplicateState { id: String },

    #[error("invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("current state is empty: no traversal has started")]
    EmptyCurrentState,

    #[error("state not found: {id}")]
    StateNotFound { id: String },

    // The field cannot be called `source`: thiserror reserves that name
    // for the error cause.
    #[error("transition target '{target}' from state '{from}' not found")]
    MissingTransitionTarget { from: String, target: String },

    #[error("guard '{expression}' failed: {reason}")]
    Guard { expression: String, reason: String },

    #[error("action '{action}' failed: {source}")]
    Action {
        action: String,
        #[source]
        source: ActionError,
    },
}

impl EngineError {
    /// Returns a stable error code for embedders and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::DuplicateState { .. } => "DUPLICATE_STATE",
            EngineError::Configuration { .. } => "INVALID_CONFIG",
            EngineError::EmptyCurrentState => "EMPTY_CURRENT_STATE",
            EngineError::StateNotFound { .. } => "STATE_NOT_FOUND",
            EngineError::MissingTransitionTarget { .. } => "MISSING_TARGET",
            EngineError::Guard { .. } => "GUARD_ERROR",
            EngineError::Action { .. } => "ACTION_FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        let err = EngineError::DuplicateState {
            id: "review".to_string(),
        };
        assert_eq!(err.error_code(), "DUPLICATE_STATE");

        let err = EngineError::Guard {
            expression: "data.x >".to_string(),
            reason: "expected a number".to_string(),
        };
        assert_eq!(err.error_code(), "GUARD_ERROR");
    }

    #[test]
    fn test_display_carries_failing_data() {
        let err = EngineError::MissingTransitionTarget {
            from: "review".to_string(),
            target: "done".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("review"));
        assert!(msg.contains("done"));
        // Plain data fields only; the originating state id is not an
        // error cause.
        assert!(std::error::Error::source(&err).is_none());
    }
}
