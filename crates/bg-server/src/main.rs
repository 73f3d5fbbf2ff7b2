//! # Breakglass
//!
//! Main entry point for the breakglass server.

#![forbid(unsafe_code)]

use bg_core::Config;
use bg_server::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Breakglass starting...");

    let config = Config::load()?;
    let server = Server::connect(config).await?;
    server.run().await
}
