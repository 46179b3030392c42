//! Geo Directory - Directory Service
//!
//! Accepts worker node registrations and redirects clients to the nearest
//! active node.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use geo_directory::{
    shutdown::shutdown_signal, DirectoryConfig, DirectoryService, DispatcherConfig, MetricsBackend,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Geo Directory - routes clients to their nearest worker node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP bind address
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    bind_addr: SocketAddr,

    /// Delay of the long-poll endpoint in seconds
    #[arg(long, env = "LONG_POLL_SECS", default_value = "10")]
    long_poll_secs: u64,

    /// Notification delivery workers
    #[arg(long, env = "NOTIFY_WORKERS", default_value = "4")]
    notify_workers: usize,

    /// Pending notifications kept before new ones are dropped
    #[arg(long, env = "NOTIFY_QUEUE", default_value = "1024")]
    notify_queue: usize,

    /// Timeout of one notification delivery in seconds
    #[arg(long, env = "NOTIFY_TIMEOUT_SECS", default_value = "5")]
    notify_timeout_secs: u64,

    /// Directory for the CSV activity logs
    #[arg(long, env = "LOG_DIR", default_value = ".")]
    log_dir: PathBuf,

    /// System metrics source for the passive log
    #[arg(long, env = "METRICS_BACKEND", value_enum, default_value = "procfs")]
    metrics_backend: MetricsBackend,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.log_json);

    info!("Starting Geo Directory");
    info!("  Version: {}", geo_directory::VERSION);
    info!("  Bind address: {}", args.bind_addr);
    info!("  Log directory: {}", args.log_dir.display());

    let config = DirectoryConfig {
        bind_addr: args.bind_addr,
        long_poll_delay: Duration::from_secs(args.long_poll_secs),
        dispatcher: DispatcherConfig {
            workers: args.notify_workers,
            queue_capacity: args.notify_queue,
            request_timeout: Duration::from_secs(args.notify_timeout_secs),
        },
        log_dir: args.log_dir,
        metrics_backend: args.metrics_backend,
    };

    let service = DirectoryService::new(config).context("failed to build directory service")?;
    service
        .run(shutdown_signal())
        .await
        .context("directory server failed")?;

    info!("Directory shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(log_level: &str, json: bool) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "tower=warn", "reqwest=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
