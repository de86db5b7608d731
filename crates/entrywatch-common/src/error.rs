//! Error types shared across entrywatch crates
//!
//! Variants carry enough context to explain a failure without a debugger.

use thiserror::Error;

/// Main error type for shared entrywatch operations
#[derive(Debug, Error)]
pub enum Error {
    /// A value failed validation (unknown record kind, empty namespace, ...)
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Where the error occurred (e.g., "telemetry")
        context: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display_includes_message() {
        let err = Error::validation("unknown record kind: mesh");
        assert_eq!(
            err.to_string(),
            "validation error: unknown record kind: mesh"
        );
    }

    #[test]
    fn internal_display_includes_context() {
        let err = Error::internal("telemetry", "subscriber already set");
        assert_eq!(
            err.to_string(),
            "internal error [telemetry]: subscriber already set"
        );
    }
}
