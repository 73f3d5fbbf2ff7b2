//! Escalation error types.

use bg_directory::DirectoryError;
use thiserror::Error;

/// Errors that can occur in the escalation engine.
#[derive(Debug, Error)]
pub enum EscalationError {
    /// Identity provider or directory failure.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Token signature, algorithm, issuer or structure is wrong.
    #[error("invalid approval token: {0}")]
    InvalidSignature(String),

    /// Token is past its expiry.
    #[error("approval token expired")]
    Expired,

    /// Token is not valid yet.
    #[error("approval token not yet valid")]
    NotYetValid,

    /// Signing keys could not be loaded.
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    /// Token could not be signed.
    #[error("token signing failed: {0}")]
    TokenSigning(String),

    /// The user has no tracked grant for the group.
    #[error("user has no active breakglass in group {0}")]
    NoActiveGrant(String),

    /// A duration does not yield a representable expiry.
    #[error("duration of {0} seconds is out of range")]
    InvalidDuration(i64),

    /// The requested transition is not open to the user.
    #[error("transition {from} -> {to} is not available")]
    TransitionNotAvailable {
        /// Source group.
        from: String,
        /// Target group.
        to: String,
    },

    /// The approver may not sign off this request.
    #[error("user is not allowed to approve this request")]
    NotAllowedApprover,
}

impl EscalationError {
    /// Checks if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        match self {
            Self::Directory(e) => e.is_not_found(),
            Self::NoActiveGrant(_) => true,
            _ => false,
        }
    }

    /// Checks if this error rejects an approval token.
    #[must_use]
    pub const fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature(_) | Self::Expired | Self::NotYetValid
        )
    }

    /// Checks if the caller lacks the right to perform the action.
    #[must_use]
    pub const fn is_forbidden(&self) -> bool {
        matches!(
            self,
            Self::NotAllowedApprover | Self::TransitionNotAvailable { .. }
        )
    }
}

/// Result type for escalation operations.
pub type EscalationResult<T> = Result<T, EscalationError>;
