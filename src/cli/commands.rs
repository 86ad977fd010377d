//! CLI commands implementation.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;

use ocrchain::config::Config;
use ocrchain::ocr::report::{format_result, supported_formats, usage_info};
use ocrchain::ocr::{FallbackPipeline, ImageBlob, ImageValidator};

#[derive(Parser)]
#[command(name = "ocrchain")]
#[command(about = "Extract text from images with OCR.space and a local Tesseract fallback")]
#[command(version)]
pub struct Cli {
    /// Config file (TOML, YAML or JSON); discovered automatically if omitted
    #[arg(short, long, global = true, env = "OCRCHAIN_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Extract text from an image file
    Extract {
        /// Image file to process
        file: PathBuf,
        /// Optional query describing what to extract
        #[arg(short, long)]
        query: Option<String>,
        /// Print the structured result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check an image against size, format and dimension limits
    Validate {
        /// Image file to check
        file: PathBuf,
    },

    /// List supported image formats
    Formats,

    /// Show usage notes and limits
    Usage,

    /// Check availability of each OCR backend (may install Tesseract)
    Check,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::load().await,
    };

    match cli.command {
        Commands::Extract { file, query, json } => {
            cmd_extract(&config, &file, query.as_deref(), json).await
        }
        Commands::Validate { file } => cmd_validate(&config, &file).await,
        Commands::Formats => {
            println!("{}", supported_formats(&config.validation));
            Ok(())
        }
        Commands::Usage => {
            println!("{}", usage_info(&config.validation));
            Ok(())
        }
        Commands::Check => cmd_check(&config).await,
    }
}

async fn read_image(file: &Path) -> anyhow::Result<ImageBlob> {
    ImageBlob::from_path(file)
        .await
        .with_context(|| format!("reading {}", file.display()))
}

async fn cmd_extract(
    config: &Config,
    file: &Path,
    query: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let image = read_image(file).await?;
    let pipeline = FallbackPipeline::from_config(config)?;
    let result = pipeline.extract(&image, query).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if result.is_success() {
        println!("{}", format_result(&result));
    } else {
        eprintln!("{} {}", style("✗").red(), format_result(&result));
    }

    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_validate(config: &Config, file: &Path) -> anyhow::Result<()> {
    let image = read_image(file).await?;
    let validator = ImageValidator::new(config.validation.clone());

    match validator.validate(&image) {
        Ok(info) => {
            println!("{} {}", style("✓").green(), file.display());
            println!("  {:<12} {}", "Format", info.format);
            println!("  {:<12} {}x{}", "Dimensions", info.width, info.height);
            println!("  {:<12} {}", "Color mode", info.color_mode);
            println!("  {:<12} {} bytes", "Size", info.byte_len);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}: {}", style("✗").red(), file.display(), e);
            std::process::exit(1);
        }
    }
}

async fn cmd_check(config: &Config) -> anyhow::Result<()> {
    let pipeline = FallbackPipeline::from_config(config)?;

    println!("\n{}", style("OCR Backends").bold());
    println!("{}", "-".repeat(50));

    let statuses = pipeline.availability().await;
    for (position, status) in statuses.iter().enumerate() {
        let label = if status.available {
            style("✓ available").green()
        } else {
            style("✗ not available").red()
        };
        println!("  {}. {:<12} {}", position + 1, status.backend, label);
        if !status.available {
            println!("                  {}", style(&status.hint).dim());
        }
    }

    if !statuses.iter().any(|s| s.available) {
        println!(
            "\n{} No OCR backend can run; extraction will fail.",
            style("!").yellow()
        );
    }
    Ok(())
}
