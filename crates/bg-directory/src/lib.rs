//! # bg-directory
//!
//! Identity provider access for the breakglass engine.
//!
//! - [`IdentityProvider`] is the boundary trait over the remote provider.
//! - [`TokenLifecycleManager`] keeps a service session alive, refreshing or
//!   re-authenticating as needed.
//! - [`GroupDirectory`] is the query and mutation surface the rest of the
//!   engine uses for groups, members and user attributes.
//!
//! [`KeycloakProvider`] talks to a Keycloak admin REST API;
//! [`InMemoryIdentityProvider`] backs tests and local runs.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod directory;
pub mod error;
pub mod keycloak;
pub mod memory;
pub mod provider;
pub mod session;

pub use directory::GroupDirectory;
pub use error::{DirectoryError, DirectoryResult};
pub use keycloak::KeycloakProvider;
pub use memory::InMemoryIdentityProvider;
pub use provider::{ClientCredentials, IdentityProvider, TokenGrant};
pub use session::{Session, SessionThresholds, TokenLifecycleManager};
