//! ip-echo: a what-is-my-IP echo server
//!
//! Answers every TCP connection with a minimal HTTP/1.1 response whose
//! body is the peer's IP address as the server sees it.
//!
//! Features:
//! - Dual-stack listener: one socket serves IPv6 and IPv4 clients
//! - Non-blocking accept/read/write driven by a readiness event loop
//! - Graceful shutdown on SIGINT or SIGTERM
//! - Configuration via CLI arguments or TOML file

mod config;
mod response;
mod runtime;

use config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        port = config.port,
        backlog = config.backlog,
        maxevents = config.maxevents,
        "Starting ip-echo server"
    );

    runtime::run(config)?;
    Ok(())
}
