//! Definition-time errors.
//!
//! These signal a broken schema or example row that the caller must fix.
//! Per-value schema violations are never errors; they are reported as
//! [`crate::MatchResult::Failure`].

/// Errors raised while resolving or interpreting patterns.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatternError {
    #[error("Undefined type {0}")]
    UndefinedType(String),
    #[error("Malformed type token '{token}': {reason}")]
    MalformedToken { token: String, reason: String },
    #[error("Cannot interpret '{value}' as {expected}")]
    InvalidRowValue { value: String, expected: String },
    #[error("Type {0} refers to itself through required fields and has no finite value")]
    CycleDetected(String),
}

impl PatternError {
    pub(crate) fn malformed(token: impl Into<String>, reason: impl Into<String>) -> Self {
        PatternError::MalformedToken {
            token: token.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_row_value(value: impl Into<String>, expected: impl Into<String>) -> Self {
        PatternError::InvalidRowValue {
            value: value.into(),
            expected: expected.into(),
        }
    }
}
