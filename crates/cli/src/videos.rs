//! `muse videos`: image-to-video batches over an input folder
//!
//! Per image: caption → upload + render → copy the video out → move the
//! source image to the processed folder.

use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Local;
use clap::Args;
use comfy::{run_pipeline, ComfyClient, Workflow};
use prompts::{CaptionService, OllamaCaptioner};
use tracing::{debug, info, warn};

use crate::{
    batch::{run_batch, BatchJob, ItemResult},
    config::Config,
    output::OutputHandler,
};

pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];
pub const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "webm", "mov", "mkv", "gif"];

/// Per-job download folders live here, inside the output directory
const STAGING_DIR: &str = ".staging";

#[derive(Debug, Args)]
pub struct VideosArgs {
    /// Folder scanned for input images
    #[arg(long, env = "INPUT_DIR")]
    pub input_dir: Option<PathBuf>,

    /// Folder receiving finished videos
    #[arg(long, env = "OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Folder receiving processed input images
    #[arg(long, env = "PROCESSED_DIR")]
    pub processed_dir: Option<PathBuf>,

    /// Image-to-video workflow JSON
    #[arg(long, env = "WORKFLOW_PATH")]
    pub workflow: Option<PathBuf>,

    /// ComfyUI server address (host:port or URL)
    #[arg(long, env = "COMFY_HOST")]
    pub server: Option<String>,

    /// Seconds to wait for each video
    #[arg(long, env = "COMFY_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Caption service URL
    #[arg(long, env = "OLLAMA_HOST")]
    pub ollama_host: Option<String>,

    /// Vision model used for captions
    #[arg(long, env = "OLLAMA_MODEL")]
    pub model: Option<String>,

    /// Skip the confirmation prompt
    #[arg(short, long, env = "MUSE_AUTO_RUN")]
    pub yes: bool,
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

/// Images directly inside `dir`, sorted by path.
pub fn find_input_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, &IMAGE_EXTENSIONS) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// First downloaded file that looks like a video.
pub fn pick_video(files: &[PathBuf]) -> Option<&PathBuf> {
    files.iter().find(|f| has_extension(f, &VIDEO_EXTENSIONS))
}

/// Moves `file` into `dir`, falling back to copy-and-delete across
/// filesystems.
pub async fn relocate(file: &Path, dir: &Path) -> Result<PathBuf> {
    let name = file
        .file_name()
        .ok_or_else(|| anyhow!("{} has no file name", file.display()))?;
    let target = dir.join(name);
    if tokio::fs::rename(file, &target).await.is_err() {
        tokio::fs::copy(file, &target)
            .await
            .with_context(|| format!("Failed to copy {} to {}", file.display(), dir.display()))?;
        tokio::fs::remove_file(file).await?;
    }
    Ok(target)
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

struct VideoBatch {
    client: ComfyClient,
    captioner: Box<dyn CaptionService>,
    workflow: Workflow,
    output_dir: PathBuf,
    processed_dir: PathBuf,
}

impl VideoBatch {
    /// Renders `image` into `staging` and copies the video out as
    /// `<output_dir>/<name>.<ext>`. Leaves `staging` for the caller to remove.
    async fn export_video(
        &self,
        image: &Path,
        prompt: &str,
        staging: &Path,
        name: &str,
    ) -> Result<PathBuf> {
        let files = run_pipeline(&self.client, image, prompt, &self.workflow, staging).await?;
        let video = pick_video(&files).ok_or_else(|| {
            anyhow!("Job produced no video ({} other file(s) in {})", files.len(), staging.display())
        })?;

        let extension = video
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "mp4".into());
        let destination = self.output_dir.join(format!("{name}.{extension}"));
        tokio::fs::copy(video, &destination)
            .await
            .with_context(|| format!("Failed to copy video to {}", destination.display()))?;
        Ok(destination)
    }
}

#[async_trait]
impl BatchJob for VideoBatch {
    type Item = PathBuf;

    fn label(&self, _index: usize, image: &PathBuf) -> String {
        image
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| image.display().to_string())
    }

    async fn run(&mut self, _index: usize, image: PathBuf) -> Result<ItemResult> {
        let stem = image
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".into());

        let prompt = self
            .captioner
            .caption(&image)
            .await
            .context("Caption failed")?;
        info!("Prompt: {}", prompt);

        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let staging = self
            .output_dir
            .join(STAGING_DIR)
            .join(format!("{stem}_{timestamp}"));

        let exported = self
            .export_video(&image, &prompt, &staging, &format!("{stem}_{timestamp}"))
            .await;
        if staging.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
                warn!("Could not clean up {}: {}", staging.display(), e);
            }
        }
        let destination = exported?;

        let moved = relocate(&image, &self.processed_dir).await?;
        debug!("Moved {} to {}", image.display(), moved.display());

        Ok(ItemResult {
            output: Some(destination),
            prompt: Some(prompt),
        })
    }
}

/// Returns whether every video succeeded.
pub async fn run(args: VideosArgs, config: &Config, output: &OutputHandler) -> Result<bool> {
    let paths = &config.paths;
    let input_dir = args.input_dir.unwrap_or_else(|| paths.video_input.clone());
    let output_dir = args.output_dir.unwrap_or_else(|| paths.video_output.clone());
    let processed_dir = args
        .processed_dir
        .unwrap_or_else(|| paths.video_processed.clone());
    let workflow_path = args.workflow.unwrap_or_else(|| paths.video_workflow.clone());

    output.print_banner("ComfyUI batch video generation");
    output.print_setting("Input", &input_dir.display().to_string());
    output.print_setting("Output", &output_dir.display().to_string());
    output.print_setting("Processed", &processed_dir.display().to_string());

    for dir in [&input_dir, &output_dir, &processed_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let images = find_input_images(&input_dir)?;
    if images.is_empty() {
        output.print_warning(&format!("No images found in {}", input_dir.display()));
        return Ok(true);
    }

    output.print_header(&format!("{} image(s) to process", images.len()));
    for image in &images {
        println!("  - {}", image.display());
    }

    let comfy_config = config.comfy_config(args.server.as_deref(), args.timeout);
    let caption_config = config.caption_config(args.ollama_host.as_deref(), args.model.as_deref());
    output.print_setting("ComfyUI", &comfy_config.base_url);
    output.print_setting("Caption model", &format!("{} @ {}", caption_config.model, caption_config.host));
    output.print_setting("Workflow", &workflow_path.display().to_string());

    if !args.yes && !confirm("Start processing?")? {
        output.print_info("Cancelled");
        return Ok(true);
    }

    let workflow = Workflow::load(&workflow_path)
        .await
        .with_context(|| format!("Failed to load workflow {}", workflow_path.display()))?;

    let mut job = VideoBatch {
        client: ComfyClient::new(comfy_config),
        captioner: Box::new(OllamaCaptioner::new(caption_config)),
        workflow,
        output_dir,
        processed_dir,
    };

    let report = run_batch(&mut job, images, output).await;
    output.print_summary("Video generation finished", &report);
    Ok(report.all_succeeded())
}
