//! roxy-fileman - Entry Point
//!
//! Sandboxed file manager backend for browser clients.

use log::{error, info};
use std::process::ExitCode;

use roxy_fileman::config::AppConfig;
use roxy_fileman::{ProfileRegistry, Server};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize the logger (env_logger picks up RUST_LOG environment variable)
    env_logger::init();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let registry = match ProfileRegistry::from_config(&config) {
        Ok(registry) => registry,
        Err(e) => {
            error!("Failed to prepare profile roots: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Launching file manager...");
    let server = match Server::bind(&config, registry).await {
        Ok(server) => server,
        Err(_) => return ExitCode::FAILURE,
    };
    server.start().await;
    ExitCode::SUCCESS
}
