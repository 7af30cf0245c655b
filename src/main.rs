// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! trashlens CLI
//!
//! Runs the describe-then-classify pipeline on local files and checks the upstream services.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use trashlens::config::AppConfig;
use trashlens::ollama::OllamaClient;
use trashlens::pipeline::Pipeline;
use trashlens::rag::RagClient;
use trashlens::{Result, TrashLensError};

/// trashlens CLI - describe and classify waste images
#[derive(Parser, Debug)]
#[command(name = "trashlens")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Describe a waste item with a vision model and classify it against a RAG workspace", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List workspaces on the classification service
    Workspaces,

    /// Describe an image within a workspace without classifying it
    Describe {
        /// Image file (jpg or png)
        image: PathBuf,

        /// Workspace slug the image belongs to
        #[arg(short, long)]
        workspace: String,
    },

    /// Describe and classify an image within a workspace
    Classify {
        /// Image file (jpg or png)
        image: PathBuf,

        /// Workspace slug to classify against
        #[arg(short, long)]
        workspace: String,
    },

    /// Show upstream service status
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration (secrets redacted)
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::load_with_env(&cli.config)?;

    match cli.command {
        Commands::Workspaces => run_workspaces(&config, &cli.format).await,
        Commands::Describe { image, workspace } => {
            run_describe(&config, &image, &workspace, &cli.format).await
        }
        Commands::Classify { image, workspace } => {
            run_classify(&config, &image, &workspace, &cli.format).await
        }
        Commands::Status => run_status(&config).await,
        Commands::Config { action } => run_config_command(config, action),
    }
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Err(TrashLensError::PreconditionUnmet(format!("{:?} is empty", path)));
    }
    Ok(bytes)
}

async fn run_workspaces(config: &AppConfig, format: &str) -> Result<()> {
    let slugs = RagClient::from_config(config)?.list_workspaces().await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&slugs)?);
    } else if slugs.is_empty() {
        println!("No workspaces available");
    } else {
        println!("Available workspaces:");
        for slug in &slugs {
            println!("  {}", slug);
        }
    }
    Ok(())
}

async fn run_describe(config: &AppConfig, image: &Path, workspace: &str, format: &str) -> Result<()> {
    let pipeline = Pipeline::from_config(config)?;
    let bytes = read_image(image)?;

    info!("Describing {:?} in workspace {}", image, workspace);
    let description = match pipeline.describe_only(Some(workspace), &bytes).await {
        Ok(description) => description,
        Err(e) => {
            eprintln!("{}", e);
            return Err(e.error);
        }
    };

    if format == "json" {
        println!("{}", serde_json::json!({ "description": description }));
    } else {
        println!("{}", description);
    }
    Ok(())
}

async fn run_classify(config: &AppConfig, image: &Path, workspace: &str, format: &str) -> Result<()> {
    let pipeline = Pipeline::from_config(config)?;
    let bytes = read_image(image)?;

    info!("Classifying {:?} in workspace {}", image, workspace);
    let analysis = match pipeline.analyze(Some(workspace), &bytes).await {
        Ok(analysis) => analysis,
        Err(e) => {
            eprintln!("{}", e);
            return Err(e.error);
        }
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        println!("Description:\n{}\n", analysis.description);
        println!("Classification: {}", analysis.label);
        if let Some(category) = analysis.category {
            println!("Matched category: {}", category);
        }
    }
    Ok(())
}

/// Run status check
async fn run_status(config: &AppConfig) -> Result<()> {
    let vision = OllamaClient::from_config(config)?;
    let rag = RagClient::from_config(config)?;

    println!("trashlens v{} Status", env!("CARGO_PKG_VERSION"));
    println!("======================");

    match vision.health_check().await {
        Ok(()) => println!("Ollama ({}): Running", vision.base_url()),
        Err(e) => println!("Ollama ({}): Error - {}", vision.base_url(), e),
    }

    match vision.model_available().await {
        Ok(true) => println!("  Vision model '{}': available", vision.model()),
        Ok(false) => println!("  Vision model '{}': not pulled (try: ollama pull {})", vision.model(), vision.model()),
        Err(e) => println!("  Error listing models: {}", e),
    }

    match rag.list_workspaces().await {
        Ok(slugs) => println!("\nAnythingLLM ({}): {} workspace(s)", rag.base_url(), slugs.len()),
        Err(e) => println!("\nAnythingLLM ({}): Error - {}", rag.base_url(), e),
    }

    println!("\nConfiguration:");
    println!("  API key: {}", if config.classifier.api_key.is_some() { "set" } else { "not set" });
    println!("  Bot token: {}", if config.bot.token.is_some() { "set" } else { "not set" });

    Ok(())
}

fn run_config_command(config: AppConfig, action: ConfigCommands) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            println!("{}", serde_json::to_string_pretty(&redacted(config))?);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
    }

    Ok(())
}

fn redacted(mut config: AppConfig) -> AppConfig {
    if config.classifier.api_key.is_some() {
        config.classifier.api_key = Some("***".to_string());
    }
    if config.bot.token.is_some() {
        config.bot.token = Some("***".to_string());
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_classify_command() {
        let cli = Cli::try_parse_from([
            "trashlens", "classify", "/tmp/can.jpg", "--workspace", "taipei"
        ]).unwrap();

        match cli.command {
            Commands::Classify { image, workspace } => {
                assert_eq!(image, PathBuf::from("/tmp/can.jpg"));
                assert_eq!(workspace, "taipei");
            }
            _ => panic!("Expected Classify command"),
        }
    }

    #[test]
    fn test_cli_classify_requires_workspace() {
        assert!(Cli::try_parse_from(["trashlens", "classify", "/tmp/can.jpg"]).is_err());
    }

    #[test]
    fn test_cli_describe_requires_workspace() {
        assert!(Cli::try_parse_from(["trashlens", "describe", "/tmp/can.jpg"]).is_err());
        let cli = Cli::try_parse_from(["trashlens", "describe", "/tmp/can.jpg", "-w", "taipei"]).unwrap();
        assert!(matches!(cli.command, Commands::Describe { ref workspace, .. } if workspace == "taipei"));
    }

    #[test]
    fn test_cli_global_format() {
        let cli = Cli::try_parse_from(["trashlens", "workspaces", "--format", "json"]).unwrap();
        assert_eq!(cli.format, "json");
        assert!(Cli::try_parse_from(["trashlens", "workspaces", "--format", "xml"]).is_err());
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let mut config = AppConfig::default();
        config.classifier.api_key = Some("sk-live".into());
        config.bot.token = Some("bot".into());
        let json = serde_json::to_string(&redacted(config)).unwrap();
        assert!(!json.contains("sk-live"));
        assert!(json.contains("***"));
    }

    #[test]
    fn test_read_image_rejects_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(read_image(file.path()).unwrap_err().is_precondition());
    }
}
