//! End-to-end helpers composing the client, poller and artifact resolver
//! for a single job.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::info;

use crate::{
    artifacts::ArtifactResolver,
    client::{ComfyClient, JobBackend},
    error::{ComfyError, Result},
    graph::{
        NodeBindings, SamplerSettings, Substitutions, Workflow, IMAGE_FILENAME_MARKER,
        NEGATIVE_PROMPT_MARKER, PROMPT_MARKER,
    },
    poller::CompletionPoller,
    record::CompletionRecord,
};

/// Result of [`render_image`]
#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub job_id: String,
    pub seed: u64,
    pub bytes: Vec<u8>,
    pub saved_to: Option<PathBuf>,
}

/// Patches, submits and waits for one workflow.
pub async fn execute<B: JobBackend + ?Sized>(
    backend: &B,
    poller: &CompletionPoller,
    workflow: &Workflow,
) -> Result<(String, CompletionRecord)> {
    let job_id = backend.submit(workflow).await?;
    let record = poller.wait(backend, &job_id).await?;
    Ok((job_id, record))
}

/// Text-to-image render: prompt markers and sampler inputs are written into
/// a copy of `template`, and the first produced artifact is returned (and
/// written to `save_path` when given).
pub async fn render_image<B: JobBackend + ?Sized>(
    backend: &B,
    poller: &CompletionPoller,
    template: &Workflow,
    settings: &SamplerSettings,
    bindings: &NodeBindings,
    save_path: Option<&Path>,
) -> Result<RenderedImage> {
    let mut substitutions = Substitutions::new();
    if let Some(text) = &settings.positive_prompt {
        substitutions.insert(PROMPT_MARKER.into(), text.clone());
    }
    substitutions.insert(
        NEGATIVE_PROMPT_MARKER.into(),
        settings.negative_prompt.clone().unwrap_or_default(),
    );

    let mut workflow = template.patched(&substitutions);
    let seed = workflow.apply_sampler(settings, bindings);

    let (job_id, record) = execute(backend, poller, &workflow).await?;
    let (descriptor, bytes) = ArtifactResolver::new(backend).fetch_first(&record).await?;

    let saved_to = match save_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(path, &bytes).await?;
            info!("Saved {} as {}", descriptor.filename, path.display());
            Some(path.to_path_buf())
        }
        None => None,
    };

    Ok(RenderedImage {
        job_id,
        seed,
        bytes,
        saved_to,
    })
}

/// Image-to-video run: upload `image_path`, substitute the image and prompt
/// markers, submit, wait, and download every artifact into `out_dir`.
pub async fn run_pipeline(
    client: &ComfyClient,
    image_path: &Path,
    prompt_text: &str,
    template: &Workflow,
    out_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let image_name = client.upload_file(image_path).await?;

    let substitutions = Substitutions::from([
        (IMAGE_FILENAME_MARKER.to_string(), image_name),
        (PROMPT_MARKER.to_string(), prompt_text.to_string()),
    ]);
    let workflow = template.patched(&substitutions);

    let config = client.config();
    let poller = CompletionPoller::new(config.poll_interval, config.poll_timeout);
    let (job_id, record) = execute(client, &poller, &workflow).await?;

    let files = ArtifactResolver::new(client)
        .collect_and_download(&record, out_dir)
        .await?;
    if files.is_empty() {
        return Err(ComfyError::Protocol(format!("job {job_id} finished without artifacts")));
    }
    Ok(files)
}
