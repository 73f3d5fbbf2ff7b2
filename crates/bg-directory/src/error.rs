//! Directory error types.

use thiserror::Error;

/// Errors raised by the identity provider boundary and the directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Neither refresh nor re-authentication produced a session.
    #[error("identity provider unavailable: {0}")]
    AuthProviderUnavailable(String),

    /// Group or user does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// More than one group carries the requested name.
    #[error("found multiple groups called {0}")]
    AmbiguousGroup(String),

    /// The request never got an answer.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered with an error status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },
}

impl DirectoryError {
    /// Checks if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Api { status: 404, .. })
    }

    /// Checks if the failure may succeed on a later attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::AuthProviderUnavailable(_) | Self::Transport(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::NotFound(_) | Self::AmbiguousGroup(_) => false,
        }
    }
}

impl From<reqwest::Error> for DirectoryError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;
