//! # bustrack-server
//!
//! Bus location tracker server: WebSocket fan-out plus an HTTP mirror.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! bustrack-server
//!
//! # Run with environment variables
//! BUSTRACK_PORT=8080 BUSTRACK_HOST=0.0.0.0 bustrack-server
//!
//! # Hosting platforms that only set PORT work too
//! PORT=8080 bustrack-server
//! ```

use anyhow::Result;
use bustrack_server::{config::Config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bustrack=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;

    tracing::info!("Starting bustrack server on {}:{}", config.host, config.port);

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}
