//! resprelay Server Binary
//!
//! Starts the relay in front of the configured backends.

use std::time::Duration;

use clap::Parser;
use resprelay::{Config, RemoteAddr, Server};
use tracing_subscriber::{fmt, EnvFilter};

/// resprelay Server
#[derive(Parser, Debug)]
#[command(name = "resprelay-server")]
#[command(about = "RESP relay with quorum fan-out and versioned reads")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:6380")]
    listen: String,

    /// Backend address: tcp://host:port, unix:///path or host:port (repeatable)
    #[arg(short, long = "remote", required = true)]
    remotes: Vec<RemoteAddr>,

    /// Minimum number of successful backend replies
    #[arg(short = 'q', long, default_value = "1")]
    min_success: u32,

    /// Fan-out timeout per command, in milliseconds
    #[arg(short, long, default_value = "1000")]
    timeout_ms: u64,

    /// Field carrying the version counter in versioned reads
    #[arg(long, default_value = "version")]
    version_field: String,

    /// Command whose replies are compared by version
    #[arg(long, default_value = "HGETALL")]
    versioned_command: String,

    /// Maximum concurrent client connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,resprelay=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .init();

    let args = Args::parse();

    tracing::info!("resprelay v{}", resprelay::VERSION);
    tracing::info!("Listen address: {}", args.listen);
    for remote in &args.remotes {
        tracing::info!("Remote: {}", remote);
    }

    // Build config from args
    let config = Config::builder()
        .listen_addr(&args.listen)
        .remotes(args.remotes)
        .min_success(args.min_success)
        .request_timeout(Duration::from_millis(args.timeout_ms))
        .version_field(args.version_field)
        .versioned_command(args.versioned_command)
        .max_connections(args.max_connections)
        .build();

    let server = match Server::bind(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start relay: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
