//! # bg-server
//!
//! Process host for the breakglass engine.
//!
//! Loads configuration, connects to Keycloak, wires the components into an
//! [`AppState`] and runs the grant reaper until a shutdown signal arrives.
//!
//! ## Usage
//!
//! ```ignore
//! use bg_server::Server;
//!
//! let config = bg_core::Config::load()?;
//! let server = Server::connect(config).await?;
//! server.run().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod state;

pub use state::AppState;

use std::sync::Arc;

use bg_core::{Clock, Config, SystemClock};
use bg_directory::{IdentityProvider, KeycloakProvider};
use tokio_util::sync::CancellationToken;

/// The breakglass server.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Connects to the configured Keycloak and wires every component.
    ///
    /// Performs one authenticate and introspect cycle so an unreachable or
    /// misconfigured identity provider fails the start.
    ///
    /// # Errors
    ///
    /// Returns an error if the approval keys are invalid or the identity
    /// provider rejects the service account.
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let provider = Arc::new(KeycloakProvider::new(&config.keycloak.url)?);
        Self::with_provider(config, provider, SystemClock::shared()).await
    }

    /// Builds a server over an arbitrary identity provider and clock.
    ///
    /// # Errors
    ///
    /// Same as [`Server::connect`].
    pub async fn with_provider(
        config: Config,
        provider: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let state = AppState::build(config, provider, clock)?;
        state.sessions.probe().await?;
        Ok(Self { state })
    }

    /// Returns the component graph.
    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Runs until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the reaper task panicked.
    pub async fn run(self) -> anyhow::Result<()> {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            trigger.cancel();
        });
        self.run_until(cancel).await
    }

    /// Runs until `cancel` fires, then waits for the reaper to stop.
    ///
    /// # Errors
    ///
    /// Returns an error if the reaper task panicked.
    pub async fn run_until(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let reaper = self.state.reaper.clone().spawn(cancel.clone());

        cancel.cancelled().await;
        reaper.await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Waits for a shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
