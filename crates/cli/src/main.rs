//! Mini Muse CLI - batch generation on a ComfyUI server
//!
//! `images` renders prompts from template catalogs, `videos` turns a folder
//! of stills into clips using vision-model captions as prompts.

mod batch;
mod commands;
mod config;
mod csv_log;
mod images;
mod output;
mod videos;

use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Mini Muse - ComfyUI batch generation
#[derive(Parser)]
#[command(name = "muse")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Batch image and video generation on a ComfyUI server")]
#[command(long_about = r#"
Mini Muse drives a ComfyUI server through its HTTP API.

Examples:
  muse images --count 10                          # 10 images, random templates
  muse images -t abstract_art -c 5                # 5 images from one template
  muse images --steps 40 --cfg 7.0 --seed 42 -c 3 # fixed parameters, seeds 42..44
  muse videos --yes                               # caption and animate video_input/*
  muse templates prompt_elements.json             # show a catalog
"#)]
struct Cli {
    /// Config file (defaults to ~/.mini-muse/config.toml)
    #[arg(long, env = "MUSE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate images from prompt templates
    Images(images::ImagesArgs),

    /// Generate videos from a folder of images
    Videos(videos::VideosArgs),

    /// List template files or describe one
    Templates(commands::TemplatesArgs),
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("muse={0},comfy={0},prompts={0},warn", log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = match &cli.config {
        Some(path) => config::Config::load_from(path)?,
        None => config::Config::load()?,
    };
    let output = output::OutputHandler::new(false);

    let all_ok = match cli.command {
        Commands::Images(args) => images::run(args, &config, &output).await?,
        Commands::Videos(args) => videos::run(args, &config, &output).await?,
        Commands::Templates(args) => {
            commands::templates(args, &config, &output).await?;
            true
        }
    };

    Ok(if all_ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
