//! Error types for the expression and coercion layer.

/// Errors raised while decomposing filters, lowering expressions to SQL or
/// coercing values to and from their database representation.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A value does not pass a field's type, range or format rule.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// A filter suffix does not map to a known operator.
    #[error("operator is not recognized: {token}")]
    UnknownOperator {
        /// The offending suffix or token.
        token: String,
    },

    /// A filter expression is structurally invalid.
    #[error("invalid filter expression: {message}")]
    InvalidFilter {
        /// What made the expression invalid.
        message: String,
    },

    /// A `case` expression was lowered without an alias.
    #[error("case expression requires an alias when used in a select")]
    MissingAlias,
}

/// Convenience alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Creates a [`CoreError::Validation`] with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a [`CoreError::InvalidFilter`] with the given message.
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a [`CoreError::Validation`].
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
