mod bootstrap;
mod health;
mod llm;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use teller_core::config::{AppConfig, LoadOptions};
use teller_engine::MetricsAggregator;

fn init_logging(config: &AppConfig) {
    use teller_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    spawn_metrics_rollup(
        app.metrics.clone(),
        Duration::from_secs(app.config.engine.metrics_rollup_interval_secs),
    );

    let state = routes::AppState { orchestrator: app.orchestrator, db_pool: app.db_pool.clone() };
    let router = routes::router(state);

    let address: SocketAddr =
        format!("{}:{}", app.config.server.bind_address, app.config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        address = %address,
        bank = %app.config.bank.name,
        "teller-server started"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "teller-server stopping"
    );

    Ok(())
}

/// Daily metrics are folded out of band; the engine never touches them in
/// the turn path. Each tick re-rolls yesterday and today, so a rollup that
/// raced a session end converges on the next pass.
fn spawn_metrics_rollup(metrics: Arc<MetricsAggregator>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let today = chrono::Utc::now().date_naive();
            for date in [today - chrono::Duration::days(1), today] {
                if let Err(error) = metrics.rollup(date).await {
                    tracing::warn!(
                        event_name = "metrics.rollup_failed",
                        date = %date,
                        error = %error,
                        "daily metrics rollup failed"
                    );
                }
            }
        }
    });
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
