//! Geo Directory - Worker Node
//!
//! Resolves its public address and location, registers with the directory
//! and serves `/health`, `/receive` and `/upload`.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use geo_directory::{
    shutdown::shutdown_signal, AddressMode, LookupConfig, MetricsBackend, WorkerAgent,
    WorkerConfig,
};

/// Geo Directory worker node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory service base URL
    #[arg(long, env = "DIRECTORY_URL", default_value = "http://localhost:8080")]
    directory_url: String,

    /// Port to listen on and advertise
    #[arg(long, env = "NODE_PORT", default_value = "8081")]
    port: u16,

    /// How the node's address is advertised
    #[arg(long, env = "ADDRESS_MODE", value_enum, default_value = "tunnel")]
    address_mode: AddressMode,

    /// System metrics source
    #[arg(long, env = "METRICS_BACKEND", value_enum, default_value = "procfs")]
    metrics_backend: MetricsBackend,

    /// Directory for uploads and CSV activity logs
    #[arg(long, env = "DATA_DIR", default_value = "serverNodeData")]
    data_dir: PathBuf,

    /// Tunnel agent API listing active tunnels
    #[arg(long, env = "TUNNEL_API_URL", default_value = "http://localhost:4040/api/tunnels")]
    tunnel_api_url: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.log_json);

    info!("Starting worker node");
    info!("  Version: {}", geo_directory::VERSION);
    info!("  Directory: {}", args.directory_url);
    info!("  Port: {}", args.port);

    let config = WorkerConfig {
        port: args.port,
        directory_url: args.directory_url,
        address_mode: args.address_mode,
        metrics_backend: args.metrics_backend,
        data_dir: args.data_dir,
        lookup: LookupConfig {
            tunnel_api_url: args.tunnel_api_url,
            ..Default::default()
        },
        ..Default::default()
    };

    let agent = WorkerAgent::new(config);
    agent
        .run(shutdown_signal())
        .await
        .context("worker node failed")?;

    info!("Worker node shutdown complete");
    Ok(())
}

fn init_logging(log_level: &str, json: bool) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
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
            .with(fmt::layer().with_target(false))
            .init();
    }
}
