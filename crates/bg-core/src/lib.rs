//! # bg-core
//!
//! Foundational pieces shared by every breakglass crate:
//!
//! - [`clock`] - injectable wall clock
//! - [`config`] - TOML configuration consumed by the engine
//! - [`event`] - audit events for privilege changes and access decisions

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;
pub mod event;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{ConfigError, ConfigResult};
pub use event::{Event, EventOutcome, EventType};
