//! # bg-escalation
//!
//! The escalation engine: which transitions exist, who may approve them,
//! and how temporary group membership is granted and taken back.
//!
//! - [`discovery`] - transitions derived from group naming conventions
//! - [`catalog`] - cached union of configured and discovered transitions
//! - [`approval`] - signed approval claims and the approver predicate
//! - [`grant`] - applying, dropping and listing grants
//! - [`reaper`] - periodic reconciliation of membership against markers
//! - [`service`] - request/approve/reject/drop orchestration

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod approval;
pub mod catalog;
pub mod discovery;
pub mod error;
pub mod grant;
pub mod reaper;
pub mod service;

pub use approval::{is_allowed_approver, ApprovalClaims, ApprovalTokenProtocol};
pub use catalog::{TransitionCatalog, TransitionSource};
pub use discovery::{SuffixConventionDiscovery, TransitionDiscovery};
pub use error::{EscalationError, EscalationResult};
pub use grant::GrantLifecycleManager;
pub use reaper::{Reaper, SweepReport};
pub use service::{Approver, BreakglassService};
