// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! trashlens Web UI
//!
//! Standalone web server for the upload form and JSON API.

use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use trashlens::config::AppConfig;
use trashlens::ollama::OllamaClient;
use trashlens::pipeline::Pipeline;
use trashlens::Result;

#[derive(Parser, Debug)]
#[command(name = "trashlens-web")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "trashlens Web UI Server")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Host to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("trashlens Web UI v{}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load_with_env(&args.config)?;

    // Apply CLI overrides
    if let Some(host) = args.host {
        config.web.host = host;
    }
    if let Some(port) = args.port {
        config.web.port = port;
    }

    let vision = OllamaClient::from_config(&config)?;
    match vision.model_available().await {
        Ok(true) => info!("Vision model '{}' available", vision.model()),
        Ok(false) => warn!("Vision model '{}' not found. Try: ollama pull {}", vision.model(), vision.model()),
        Err(e) => warn!("Ollama not reachable at {}: {}", vision.base_url(), e),
    }

    let pipeline = Pipeline::from_config(&config)?;
    trashlens::web::start_server(config, pipeline).await
}
