//! # bg-model
//!
//! Domain model for breakglass privilege escalation.
//!
//! These types mirror the identity provider's representations closely enough
//! to travel over its admin API unchanged, and carry the grant-marker
//! serialization contract used to track elevation expiry.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod group;
pub mod marker;
pub mod transition;
pub mod user;

pub use group::Group;
pub use marker::{GrantMarker, MalformedMarker, MarkerStatus, MARKER_PREFIX};
pub use transition::{Requestor, Transition};
pub use user::User;
