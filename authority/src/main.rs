//! Licensor reference activation authority.
//!
//! Serves the activation protocol over HTTP from an in-memory store:
//! 1. Subscription lookup, status checks and credential activation
//! 2. Subscription code validation and redemption
//! 3. Emailed passcodes (written to the log)
//! 4. Device transfers with single-use tokens and a rolling quota
//! 5. Free trials and passcode-confirmed code rebinding
//!
//! Usage:
//!   licensor-authority --port 4080 --seed seed.json
//!
//! State is lost on restart.

use anyhow::{Context, Result};
use chrono::Duration;
use clap::Parser;
use licensor_activation::SystemClock;
use licensor_activation::config::OTP_TTL_SECS;
use licensor_authority::{AuthorityOptions, MemoryAuthority, Seed, TracingMailer, build_router};
use std::{path::PathBuf, sync::Arc};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

/// How often expired codes and idle throttle windows are dropped.
const PURGE_INTERVAL_SECS: u64 = 60;

const MAX_OTP_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Parser, Debug)]
#[command(name = "licensor-authority")]
#[command(about = "Licensor reference activation authority")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, default_value = "4080", env = "LICENSOR_AUTHORITY_PORT")]
    port: u16,

    /// JSON file with subscriptions and codes to preload
    #[arg(short, long)]
    seed: Option<PathBuf>,

    /// Lifetime of emailed passcodes, in seconds (at most one day)
    #[arg(
        long,
        default_value_t = OTP_TTL_SECS,
        value_parser = clap::value_parser!(i64).range(1..=MAX_OTP_TTL_SECS)
    )]
    otp_ttl_secs: i64,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("Licensor authority starting...");
    let options = AuthorityOptions {
        otp_ttl: Duration::seconds(args.otp_ttl_secs),
        ..AuthorityOptions::default()
    };
    let authority = Arc::new(MemoryAuthority::with_options(
        Arc::new(TracingMailer),
        Arc::new(SystemClock),
        options,
    ));

    if let Some(path) = &args.seed {
        info!("Loading seed from {:?}", path);
        let seed = Seed::load(path)?;
        authority.apply_seed(seed);
    }

    let purger = Arc::clone(&authority);
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(PURGE_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            purger.purge_expired();
        }
    });

    let app = build_router(authority);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port))
        .await
        .with_context(|| format!("Failed to bind HTTP port {}", args.port))?;
    info!("HTTP API listening on port {}", args.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Licensor authority stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
