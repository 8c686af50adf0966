//! Storefront notifier process.
//!
//! Mirrors orders and feedback into the moderators' Telegram group until
//! Ctrl+C or SIGTERM.

use storefront_sync::{Application, Config, shutdown_signal};
use storefront_sync_runtime::metrics::MetricsServer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("storefront_sync={}", config.server.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        workers = config.workers.pool_size,
        queue_capacity = config.workers.queue_capacity,
        telegram_enabled = config.telegram.enabled,
        "Starting storefront notifier"
    );

    if let Some(addr) = config.server.metrics_addr {
        if let Err(e) = MetricsServer::new(addr).start() {
            error!(error = %e, "Failed to start metrics server");
        }
    }

    let app = Application::build(&config).await?;
    app.run(shutdown_signal()).await;

    Ok(())
}
