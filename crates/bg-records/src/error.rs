//! Record store error types.

use thiserror::Error;

/// Errors raised by record stores and selectors.
#[derive(Debug, Error)]
pub enum RecordError {
    /// No record with this name.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Record kind.
        kind: &'static str,
        /// Record name.
        name: String,
    },

    /// A record with this name already exists.
    #[error("{kind} already exists: {name}")]
    Duplicate {
        /// Record kind.
        kind: &'static str,
        /// Record name.
        name: String,
    },

    /// The selector names a field the record kind does not index.
    #[error("field label not supported for {kind}: {field}")]
    UnsupportedField {
        /// Record kind.
        kind: &'static str,
        /// Field label.
        field: String,
    },

    /// The selector string could not be parsed.
    #[error("invalid field selector: {0}")]
    InvalidSelector(String),

    /// Backend failure.
    #[error("record store error: {0}")]
    Backend(String),
}

impl RecordError {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Checks if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Checks if this is a duplicate error.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// Result type for record operations.
pub type RecordResult<T> = Result<T, RecordError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let err = RecordError::not_found("BreakglassSession", "s-1");
        assert!(err.is_not_found());
        assert!(!err.is_duplicate());
        assert!(err.to_string().contains("s-1"));
    }
}
