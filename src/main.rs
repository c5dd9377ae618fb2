// src/main.rs

//! The main entry point for the secmux broker daemon.

use anyhow::Result;
use secmux::config::Config;
use secmux::server;
use std::env;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    // Define version information.
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    // Collect command-line arguments to decide the execution mode.
    let args: Vec<String> = env::args().collect();

    // Handle the --version flag.
    if args.contains(&"--version".to_string()) {
        println!("secmux version {VERSION}");
        return Ok(());
    }

    // Determine the configuration path. It can be provided via a --config
    // flag; otherwise, it defaults to "secmux.toml".
    let explicit_config = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());
    let config_path = explicit_config.unwrap_or("secmux.toml");

    // Load the broker configuration. An explicitly named file must exist;
    // a missing default file just means running with built-in defaults.
    let mut config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            if explicit_config.is_some() || std::path::Path::new(config_path).exists() {
                eprintln!("Failed to load configuration from \"{config_path}\": {e}");
                std::process::exit(1);
            }
            Config::default()
        }
    };

    // Override the control socket path if provided as a command-line argument.
    if let Some(socket_index) = args.iter().position(|arg| arg == "--socket") {
        if let Some(socket_path) = args.get(socket_index + 1) {
            config.socket_path = socket_path.clone();
        } else {
            eprintln!("--socket flag requires a value");
            std::process::exit(1);
        }
    }

    // Get the log level from the env var, falling back to the config file.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .compact() // Use the compact, single-line format.
        .with_ansi(true) // Enable ANSI color codes for log levels.
        .init();

    info!("Starting secmux {VERSION}...");

    if let Err(e) = server::run(config).await {
        error!("Broker runtime error: {}", e);
        return Err(e);
    }

    Ok(())
}
