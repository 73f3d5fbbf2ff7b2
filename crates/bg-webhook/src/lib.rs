//! # bg-webhook
//!
//! Admission-time authorization for escalated subjects.
//!
//! [`AccessReviewEngine`] keeps a ledger of [`ReviewRecord`]s keyed by
//! cluster and subject and answers allow/deny for each query.
//! [`AdmissionWebhook`] adapts it to the `SubjectAccessReview` wire format.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod admission;
pub mod engine;
pub mod error;
pub mod review;

pub use admission::{
    AdmissionWebhook, SubjectAccessReview, SubjectAccessReviewResponse, SubjectAccessReviewStatus,
};
pub use engine::{AccessReviewEngine, Decision};
pub use error::{ReviewError, ReviewResult};
pub use review::{ResourceAttributes, ReviewRecord, ReviewStatus, SubjectAccessReviewSpec};
