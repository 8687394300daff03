//! HTTP client for the ComfyUI job API
//!
//! Four primitives: upload an input image, queue a workflow, read a job's
//! history entry and download one artifact. The poller and artifact resolver
//! only see the [`JobBackend`] trait, so tests can swap the transport out.

use std::path::Path;

use async_trait::async_trait;
use reqwest::{multipart, Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::{
    config::ComfyConfig,
    error::{ComfyError, Result},
    graph::Workflow,
    record::{ArtifactDescriptor, CompletionRecord},
};

/// Primitives of a remote job-execution service
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Stores `bytes` on the server under `name`; returns the stored name.
    async fn upload(&self, bytes: Vec<u8>, name: &str) -> Result<String>;

    /// Queues a patched workflow and returns its job id.
    async fn submit(&self, workflow: &Workflow) -> Result<String>;

    /// Best-effort history read. `Ok(None)` means nothing visible yet.
    async fn fetch_history(&self, job_id: &str) -> Result<Option<CompletionRecord>>;

    async fn fetch_artifact(&self, descriptor: &ArtifactDescriptor) -> Result<Vec<u8>>;
}

#[derive(Clone)]
pub struct ComfyClient {
    client: Client,
    config: ComfyConfig,
}

impl ComfyClient {
    pub fn new(config: ComfyConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &ComfyConfig {
        &self.config
    }

    /// Reads a local file and uploads it under its own file name.
    pub async fn upload_file(&self, path: &Path) -> Result<String> {
        if !path.exists() {
            return Err(ComfyError::NotFound(path.to_path_buf()));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ComfyError::NotFound(path.to_path_buf()))?;
        let bytes = tokio::fs::read(path).await?;
        self.upload(bytes, &name).await
    }

    async fn send(&self, url: &str, request: reqwest::RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|source| ComfyError::Connection {
            url: url.to_string(),
            source,
        })?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(ComfyError::Transport {
            status,
            url: url.to_string(),
            body,
        })
    }

    /// One GET against a history endpoint. Non-success statuses and bodies
    /// that are not JSON come back as `None`.
    async fn read_history(&self, url: &str) -> Result<Option<Value>> {
        let response = self
            .client
            .get(url)
            .timeout(self.config.history_timeout)
            .send()
            .await
            .map_err(|source| ComfyError::Connection {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            debug!("History read {} returned {}", url, response.status());
            return Ok(None);
        }
        Ok(response.json::<Value>().await.ok())
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    name: Option<String>,
}

#[async_trait]
impl JobBackend for ComfyClient {
    async fn upload(&self, bytes: Vec<u8>, name: &str) -> Result<String> {
        let url = self.config.endpoint("/upload/image");
        let part = multipart::Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| ComfyError::Protocol(e.to_string()))?;
        let form = multipart::Form::new()
            .part("image", part)
            .text("overwrite", "true");

        let request = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(self.config.transfer_timeout);
        let response = self.send(&url, request).await?;

        // ComfyUI echoes the stored name; fall back to ours when it does not
        let stored = response
            .json::<UploadResponse>()
            .await
            .ok()
            .and_then(|r| r.name)
            .unwrap_or_else(|| name.to_string());
        info!("Uploaded {} as {}", name, stored);
        Ok(stored)
    }

    async fn submit(&self, workflow: &Workflow) -> Result<String> {
        let url = self.config.endpoint("/prompt");
        let request = self
            .client
            .post(&url)
            .json(&json!({
                "prompt": workflow.to_value(),
                "client_id": self.config.client_id,
            }))
            .timeout(self.config.request_timeout);
        let response = self.send(&url, request).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ComfyError::Protocol(format!("submit response is not JSON: {e}")))?;
        match body.get("prompt_id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => {
                info!("Queued job {}", id);
                Ok(id.to_string())
            }
            _ => Err(ComfyError::Protocol(format!(
                "prompt_id not found in response: {body}"
            ))),
        }
    }

    async fn fetch_history(&self, job_id: &str) -> Result<Option<CompletionRecord>> {
        let by_id = self.config.endpoint(&format!("/history/{job_id}"));
        if let Some(record) = self
            .read_history(&by_id)
            .await?
            .and_then(|body| CompletionRecord::from_history(&body, job_id))
            .filter(CompletionRecord::is_complete)
        {
            return Ok(Some(record));
        }

        // some builds only list finished jobs in the full history
        let all = self.config.endpoint("/history");
        Ok(self
            .read_history(&all)
            .await?
            .and_then(|body| body.get(job_id).cloned())
            .and_then(|entry| CompletionRecord::from_history(&entry, job_id)))
    }

    async fn fetch_artifact(&self, descriptor: &ArtifactDescriptor) -> Result<Vec<u8>> {
        let url = self.config.endpoint("/view");
        let request = self
            .client
            .get(&url)
            .query(&[
                ("filename", descriptor.filename.as_str()),
                ("subfolder", descriptor.subfolder.as_str()),
                ("type", descriptor.storage.as_str()),
            ])
            .timeout(self.config.transfer_timeout);
        let response = self.send(&url, request).await?;
        let bytes = response.bytes().await.map_err(|source| ComfyError::Connection {
            url: url.clone(),
            source,
        })?;
        debug!("Fetched {} ({} bytes)", descriptor.filename, bytes.len());
        Ok(bytes.to_vec())
    }
}
