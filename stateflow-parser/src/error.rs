//! Parser error types.

use thiserror::Error;

/// Errors from parsing machine documents and building engines.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unknown action type: {action_type}")]
    UnknownActionType { action_type: String },

    #[error("invalid action '{name}': {reason}")]
    InvalidAction { name: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Engine(#[from] stateflow_core::EngineError),
}

impl ParseError {
    /// Returns a stable error code for embedders and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            ParseError::UnknownActionType { .. } => "UNKNOWN_ACTION_TYPE",
            ParseError::InvalidAction { .. } => "INVALID_ACTION",
            ParseError::Json(_) => "BAD_DOCUMENT",
            ParseError::Yaml(_) => "BAD_DOCUMENT",
            ParseError::Engine(e) => e.error_code(),
        }
    }
}
