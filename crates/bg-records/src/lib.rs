//! # bg-records
//!
//! Structured records kept in an external object store.
//!
//! - [`BreakglassSession`] - an escalated session on a cluster
//! - [`BreakglassEscalation`] - who may escalate to which group on a cluster
//! - [`FieldSelector`] - exact-match, AND-combined field queries
//! - [`RecordStore`] - list, create and status update over one record kind

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod escalation;
pub mod memory;
pub mod selector;
pub mod session;
pub mod store;

pub use error::{RecordError, RecordResult};
pub use escalation::{
    possible_escalations, BreakglassEscalation, EscalationApprovers, EscalationSpec,
};
pub use memory::InMemoryRecordStore;
pub use selector::{FieldSelector, Selectable};
pub use session::{BreakglassSession, SessionSpec, SessionStatus};
pub use store::{ObjectMeta, Record, RecordStore};
