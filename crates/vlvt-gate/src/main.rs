//! # VLVT Gate - request integrity and inter-service trust
//!
//! Guards the VLVT API surface: HMAC request signing, internal-service
//! authentication, CSRF double-submit checks, identity-aware rate limiting,
//! and the After-Hours authorization gate.
//!
//! ## Architecture
//! ```text
//! Session service → VLVT Gate → downstream services
//!                     ↓     ↓
//!          Redis (counters)  SQLite (users, subscriptions)
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod after_hours;
mod clock;
mod config;
mod csrf;
mod db;
mod exemptions;
mod principal;
mod ratelimit;
mod response;
mod routes;
mod signing;
mod state;
#[cfg(test)]
mod testing;

use clock::SystemClock;
use config::AppConfig;
use db::SqliteExecutor;
use ratelimit::{memory_sweeper, redis_connector};
use state::AppState;

/// VLVT Gate - request integrity layer
#[derive(Parser, Debug)]
#[command(name = "vlvt-gate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/vlvt-gate.toml")]
    config: String,

    /// Deployment environment (overrides config)
    #[arg(long, env = "VLVT_ENV")]
    environment: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Redis URL (overrides config; empty keeps counters in memory)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// SQLite database path (overrides config)
    #[arg(long, env = "DATABASE_PATH")]
    database: Option<String>,

    /// Client request signing secret
    #[arg(long, env = "REQUEST_SIGNING_SECRET", hide_env_values = true)]
    signing_secret: Option<String>,

    /// Service-to-service secret (defaults to the signing secret)
    #[arg(long, env = "INTERNAL_SERVICE_SECRET", hide_env_values = true)]
    internal_secret: Option<String>,

    /// Signature timestamp tolerance in milliseconds
    #[arg(long, env = "SIGNATURE_TOLERANCE_MS")]
    tolerance_ms: Option<i64>,

    /// Trust X-Forwarded-For from the fronting proxy
    #[arg(long, default_value = "false")]
    trust_proxy: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting VLVT Gate v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(&args.config, &args)?;
    info!(
        environment = %config.environment,
        "Configuration loaded from {}",
        args.config
    );

    let db = SqliteExecutor::open(&config.database_path)?;
    info!(path = %config.database_path, "Database opened");

    let state = AppState::new(config.clone(), Arc::new(db), Arc::new(SystemClock))?;

    // Create shutdown broadcast channel
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    // Counters start in memory; Redis is swapped in once reachable
    match config.redis_url() {
        Some(url) => {
            tokio::spawn(redis_connector(
                state.store.clone(),
                url.to_string(),
                Duration::from_secs(config.rate_limit.redis_retry_secs.max(1)),
                shutdown_tx.subscribe(),
            ));
        }
        None => warn!("No Redis URL configured, rate limit counters are per-instance"),
    }

    tokio::spawn(memory_sweeper(
        state.store.clone(),
        Duration::from_secs(config.rate_limit.sweep_interval_secs.max(1)),
        shutdown_tx.subscribe(),
    ));

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("VLVT Gate listening on {}", config.listen_addr);

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await
    .context("Server error")?;

    info!("VLVT Gate shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}
