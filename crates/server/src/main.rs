mod api;
mod audit;
mod bootstrap;
mod email;
mod health;
mod lifecycle;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use matreq_core::config::{AppConfig, LoadOptions};
use tokio::sync::Notify;

fn init_logging(config: &AppConfig) {
    use matreq_core::config::LogFormat::*;
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
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        request_id = "unknown",
        bind_address = %address,
        "matreq-server listening"
    );

    let shutdown = Arc::new(Notify::new());
    let signal = Arc::clone(&shutdown);
    let serve = axum::serve(listener, app.router())
        .with_graceful_shutdown(async move { signal.notified().await });
    let mut server = tokio::spawn(async move { serve.await });

    tokio::select! {
        joined = &mut server => {
            joined??;
            return Ok(());
        }
        result = wait_for_shutdown() => result?,
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        request_id = "unknown",
        "matreq-server draining in-flight requests"
    );
    shutdown.notify_one();

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, &mut server).await {
        Ok(joined) => joined??,
        Err(_) => {
            tracing::warn!(
                event_name = "system.server.shutdown_timeout",
                correlation_id = "shutdown",
                request_id = "unknown",
                grace_secs = grace.as_secs(),
                "graceful shutdown window elapsed; aborting"
            );
            server.abort();
        }
    }

    app.db_pool.close().await;
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
