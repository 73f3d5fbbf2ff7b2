//! Review error types.

use thiserror::Error;
use uuid::Uuid;

use crate::review::ReviewStatus;

/// Errors raised by the review ledger and the webhook.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// No review with this id.
    #[error("review not found: {0}")]
    NotFound(Uuid),

    /// The review was already accepted or rejected.
    #[error("review {id} already {status}")]
    AlreadyDecided {
        /// Review id.
        id: Uuid,
        /// Current status.
        status: ReviewStatus,
    },

    /// The admission request body could not be decoded.
    #[error("malformed admission request: {0}")]
    Decode(String),
}

impl ReviewError {
    /// Checks if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::AlreadyDecided { .. } => 409,
            Self::Decode(_) => 422,
        }
    }
}

impl From<serde_json::Error> for ReviewError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result type for review operations.
pub type ReviewResult<T> = Result<T, ReviewError>;
