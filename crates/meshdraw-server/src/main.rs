//! # meshdraw
//!
//! Prize draw server for a Meshtastic mesh. Nodes register by sending the
//! keyword as a text message; a web front end triggers the draw over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! # Pipe packets from a radio bridge on stdin
//! meshtastic-bridge | meshdraw
//!
//! # Run with a custom config
//! MESHDRAW_CONFIG=/path/to/meshdraw.toml meshdraw
//!
//! # Run with environment variables
//! MESHDRAW_PORT=5000 MESHDRAW_HOST=0.0.0.0 meshdraw
//! ```

mod config;
mod handlers;
mod listener;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meshdraw=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!(
        "Starting meshdraw on {}:{} with {} prize tiers",
        config.host,
        config.port,
        config.lottery.prizes.len()
    );

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
