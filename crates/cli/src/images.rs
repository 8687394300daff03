//! `muse images`: text-to-image batches from prompt templates

use std::{path::PathBuf, time::Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use clap::Args;
use comfy::{render_image, ComfyClient, CompletionPoller, NodeBindings, SamplerSettings, Workflow};
use prompts::{list_template_files, PromptCatalog};
use rand::{rngs::StdRng, SeedableRng};
use tracing::{info, warn};

use crate::{
    batch::{run_batch, BatchJob, ItemResult},
    config::Config,
    csv_log::{GenerationLog, GenerationRow},
    output::{truncate, OutputHandler},
};

pub const DEFAULT_NEGATIVE_PROMPT: &str = "blurry, low quality, distorted, ugly, deformed";

#[derive(Debug, Args)]
pub struct ImagesArgs {
    /// Number of images to generate
    #[arg(short, long, default_value_t = 1)]
    pub count: usize,

    /// Prompt template name (a random template per image when omitted)
    #[arg(short, long)]
    pub template: Option<String>,

    /// Catalog file; a bare file name is looked up in the prompts directory
    #[arg(long)]
    pub template_file: Option<String>,

    /// List available catalog files and exit
    #[arg(long)]
    pub list_templates: bool,

    /// ComfyUI server address (host:port or URL)
    #[arg(long, env = "COMFY_HOST")]
    pub server: Option<String>,

    /// Workflow JSON exported from ComfyUI
    #[arg(long)]
    pub workflow: Option<PathBuf>,

    /// Sampling steps
    #[arg(long, default_value_t = 30)]
    pub steps: u32,

    /// CFG scale
    #[arg(long, default_value_t = 5.45)]
    pub cfg: f64,

    #[arg(long, default_value_t = 1024)]
    pub width: u32,

    #[arg(long, default_value_t = 1024)]
    pub height: u32,

    /// Seed; incremented per image when generating several (random when omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Base output directory; images go to a per-day folder below it
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_NEGATIVE_PROMPT)]
    pub negative_prompt: String,
}

/// Seed for item `index`: a fixed seed advances by the index in multi-image
/// batches.
pub fn seed_for(seed: Option<u64>, count: usize, index: usize) -> Option<u64> {
    seed.map(|s| if count > 1 { s.wrapping_add(index as u64) } else { s })
}

/// `<template|random>_<timestamp>_<NNNN>.png`
pub fn image_filename(template: Option<&str>, timestamp: &str, index: usize) -> String {
    format!("{}_{}_{:04}.png", template.unwrap_or("random"), timestamp, index + 1)
}

struct ImageBatch {
    client: ComfyClient,
    poller: CompletionPoller,
    workflow: Workflow,
    bindings: NodeBindings,
    catalog: PromptCatalog,
    rng: StdRng,
    template: Option<String>,
    base_settings: SamplerSettings,
    seed: Option<u64>,
    count: usize,
    output_dir: PathBuf,
}

#[async_trait]
impl BatchJob for ImageBatch {
    type Item = usize;

    fn label(&self, _index: usize, _item: &usize) -> String {
        format!("Generating {} image", self.template.as_deref().unwrap_or("random"))
    }

    async fn run(&mut self, index: usize, _item: usize) -> Result<ItemResult> {
        // Date is re-read per image so long batches roll over at midnight
        let day = Local::now().format("%Y%m%d").to_string();
        let day_dir = self.output_dir.join(&day);
        tokio::fs::create_dir_all(&day_dir)
            .await
            .with_context(|| format!("Failed to create {}", day_dir.display()))?;

        let prompt = self.catalog.generate(self.template.as_deref(), &mut self.rng)?;
        if !prompt.missing.is_empty() {
            warn!("Catalog has no values for: {}", prompt.missing.join(", "));
        }
        info!("Prompt: {}", truncate(&prompt.text, 80));

        let settings = SamplerSettings {
            positive_prompt: Some(prompt.text.clone()),
            seed: seed_for(self.seed, self.count, index),
            ..self.base_settings.clone()
        };

        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let filename = image_filename(self.template.as_deref(), &timestamp, index);
        let path = day_dir.join(&filename);

        let started = Instant::now();
        let rendered = render_image(
            &self.client,
            &self.poller,
            &self.workflow,
            &settings,
            &self.bindings,
            Some(&path),
        )
        .await?;
        let elapsed = started.elapsed();

        let log = GenerationLog::for_day(&day_dir, &day);
        log.append(&GenerationRow {
            filename,
            template: self.template.clone().unwrap_or_else(|| "random".into()),
            positive_prompt: prompt.text.clone(),
            negative_prompt: settings.negative_prompt.clone().unwrap_or_default(),
            seed: rendered.seed,
            steps: settings.steps,
            cfg: settings.cfg,
            width: settings.width,
            height: settings.height,
            image_size_bytes: rendered.bytes.len(),
            generation_time_seconds: format!("{:.2}", elapsed.as_secs_f64()),
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        })?;
        info!(
            "{} bytes, seed {}, logged to {}",
            rendered.bytes.len(),
            rendered.seed,
            log.path().display()
        );

        Ok(ItemResult {
            output: rendered.saved_to,
            prompt: Some(prompt.text),
        })
    }
}

/// Returns whether every image succeeded.
pub async fn run(args: ImagesArgs, config: &Config, output: &OutputHandler) -> Result<bool> {
    let prompts_dir = &config.paths.prompts_dir;

    if args.list_templates {
        let files = list_template_files(prompts_dir)?;
        output.print_file_list("Available template files", &files);
        return Ok(true);
    }

    output.print_banner("ComfyUI batch image generation");

    let comfy_config = config.comfy_config(args.server.as_deref(), None);
    let workflow_path = args
        .workflow
        .clone()
        .unwrap_or_else(|| config.paths.image_workflow.clone());
    let catalog_path = PromptCatalog::resolve_path(prompts_dir, args.template_file.as_deref());
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.paths.image_output.clone());

    output.print_setting("Server", &comfy_config.base_url);
    output.print_setting("Workflow", &workflow_path.display().to_string());
    output.print_setting("Catalog", &catalog_path.display().to_string());

    let workflow = Workflow::load(&workflow_path)
        .await
        .with_context(|| format!("Failed to load workflow {}", workflow_path.display()))?;
    let catalog = PromptCatalog::load(&catalog_path).await?;
    if let Some(name) = &args.template {
        // fail before any job is queued
        if catalog.template_info(name).is_none() {
            return Err(prompts::PromptError::TemplateNotFound {
                name: name.clone(),
                available: catalog.template_names(),
            }
            .into());
        }
    }

    output.print_setting("Count", &args.count.to_string());
    output.print_setting(
        "Template",
        args.template.as_deref().unwrap_or("random per image"),
    );
    output.print_setting("Steps", &args.steps.to_string());
    output.print_setting("CFG", &args.cfg.to_string());
    output.print_setting("Size", &format!("{}x{}", args.width, args.height));
    output.print_setting(
        "Seed",
        &args.seed.map_or_else(|| "random".to_string(), |s| s.to_string()),
    );
    output.print_setting("Output", &output_dir.display().to_string());

    let poller = CompletionPoller::new(comfy_config.poll_interval, comfy_config.poll_timeout);
    let mut job = ImageBatch {
        client: ComfyClient::new(comfy_config),
        poller,
        workflow,
        bindings: NodeBindings::default(),
        catalog,
        rng: StdRng::from_entropy(),
        template: args.template,
        base_settings: SamplerSettings {
            positive_prompt: None,
            negative_prompt: Some(args.negative_prompt),
            seed: None,
            steps: args.steps,
            cfg: args.cfg,
            width: args.width,
            height: args.height,
        },
        seed: args.seed,
        count: args.count,
        output_dir,
    };

    let report = run_batch(&mut job, (0..args.count).collect(), output).await;
    output.print_summary("Image generation finished", &report);
    Ok(report.all_succeeded())
}
