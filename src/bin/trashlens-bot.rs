// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! trashlens Discord bot

use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};

use trashlens::bot::discord::DiscordGateway;
use trashlens::bot::CommandHandler;
use trashlens::config::AppConfig;
use trashlens::ollama::OllamaClient;
use trashlens::pipeline::Pipeline;
use trashlens::session::SessionStore;
use trashlens::Result;

#[derive(Parser, Debug)]
#[command(name = "trashlens-bot")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "trashlens chat bot for Discord")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = AppConfig::load_with_env(&args.config)?;
    let token = config.require_bot_token()?.to_string();

    let vision = OllamaClient::from_config(&config)?;
    if let Err(e) = vision.health_check().await {
        warn!("Ollama not reachable at {}: {}", vision.base_url(), e);
    }

    let handler = CommandHandler::new(
        Pipeline::from_config(&config)?,
        SessionStore::from_config(&config.session),
        config.bot.prefix.clone(),
    )
    .into_shared();

    let mut gateway = DiscordGateway::new(&token, handler);

    tokio::select! {
        result = gateway.run() => result?,
        _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down..."),
    }

    Ok(())
}
