//! Vision-model captioning for image-to-video batches
//!
//! Sends an image to an Ollama-compatible `/api/generate` endpoint and
//! returns the model's answer as a single-line prompt.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::CaptionError;

pub const DEFAULT_ANALYSIS_PROMPT: &str = "Analyze this image and output a single concise prompt for a 5-second video animation. \
Format strictly: \"[subject], [motion], [camera movement], [atmosphere]\". \
No extra words.";

const DEFAULT_HOST: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llava";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionConfig {
    pub host: String,
    pub model: String,
    /// Instruction sent alongside the image
    pub instruction: String,
    pub timeout: Duration,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_HOST.into()),
            model: std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into()),
            instruction: DEFAULT_ANALYSIS_PROMPT.into(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Turns an image into prompt text.
#[async_trait]
pub trait CaptionService: Send + Sync {
    async fn caption(&self, image_path: &Path) -> Result<String, CaptionError>;
}

pub struct OllamaCaptioner {
    client: reqwest::Client,
    config: CaptionConfig,
}

impl OllamaCaptioner {
    pub fn new(config: CaptionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &CaptionConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.config.host.trim_end_matches('/'))
    }

    /// Caption for raw image bytes.
    pub async fn caption_bytes(&self, image: &[u8]) -> Result<String, CaptionError> {
        let url = self.endpoint();
        let body = json!({
            "model": self.config.model,
            "prompt": self.config.instruction,
            "images": [STANDARD.encode(image)],
            "stream": false,
        });

        debug!("Requesting caption from {} ({})", url, self.config.model);
        let response = self
            .client
            .post(&url)
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| CaptionError::Transport {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CaptionError::Transport {
                url,
                message: format!("{}: {}", status, text),
            });
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| CaptionError::Protocol(format!("response is not JSON: {e}")))?;

        let raw = match data.get("response") {
            Some(Value::String(text)) => text.as_str(),
            Some(Value::Null) => "",
            Some(other) => {
                return Err(CaptionError::Protocol(format!(
                    "'response' is not a string: {other}"
                )))
            }
            None => {
                let fields: Vec<&str> = data
                    .as_object()
                    .map(|o| o.keys().map(String::as_str).collect())
                    .unwrap_or_default();
                return Err(CaptionError::Protocol(format!(
                    "unexpected response fields: {fields:?}"
                )));
            }
        };

        normalize_caption(raw).ok_or(CaptionError::EmptyResponse)
    }
}

#[async_trait]
impl CaptionService for OllamaCaptioner {
    async fn caption(&self, image_path: &Path) -> Result<String, CaptionError> {
        if !image_path.exists() {
            return Err(CaptionError::NotFound(image_path.to_path_buf()));
        }
        let bytes = tokio::fs::read(image_path).await?;
        let caption = self.caption_bytes(&bytes).await?;
        info!("Caption for {}: {}", image_path.display(), caption);
        Ok(caption)
    }
}

/// One line, trimmed, without a single trailing period. `None` if nothing
/// is left.
pub fn normalize_caption(raw: &str) -> Option<String> {
    let mut text = raw.trim().replace(['\r', '\n'], " ");
    if text.is_empty() {
        return None;
    }
    if text.ends_with('.') {
        text.pop();
    }
    Some(text)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{extract::State, routing::post, Json, Router};

    use super::*;

    #[test]
    fn test_normalize_caption() {
        assert_eq!(
            normalize_caption("  A fox runs,\nslow pan, dusk haze.\n").as_deref(),
            Some("A fox runs, slow pan, dusk haze")
        );
        assert_eq!(normalize_caption("ends with dots..").as_deref(), Some("ends with dots."));
        assert_eq!(normalize_caption(" \n "), None);
    }

    async fn spawn(reply: Value, seen: Arc<Mutex<Vec<Value>>>) -> String {
        let app = Router::new()
            .route(
                "/api/generate",
                post(
                    |State((reply, seen)): State<(Value, Arc<Mutex<Vec<Value>>>)>,
                     Json(body): Json<Value>| async move {
                        seen.lock().unwrap().push(body);
                        Json(reply)
                    },
                ),
            )
            .with_state((reply, seen));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn captioner(host: String) -> OllamaCaptioner {
        OllamaCaptioner::new(CaptionConfig {
            host,
            model: "llava:7b".into(),
            instruction: DEFAULT_ANALYSIS_PROMPT.into(),
            timeout: Duration::from_secs(5),
        })
    }

    #[tokio::test]
    async fn test_caption_sends_image_and_normalizes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let host = spawn(
            json!({ "model": "llava:7b", "response": " Neon city, rain falling, slow dolly, moody.\n", "done": true }),
            seen.clone(),
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("city.png");
        std::fs::write(&image, b"png-bytes").unwrap();

        let caption = captioner(host).caption(&image).await.unwrap();
        assert_eq!(caption, "Neon city, rain falling, slow dolly, moody");

        let body = &seen.lock().unwrap()[0];
        assert_eq!(body["model"], "llava:7b");
        assert_eq!(body["stream"], false);
        assert_eq!(body["images"][0], STANDARD.encode(b"png-bytes"));
        assert_eq!(body["prompt"], DEFAULT_ANALYSIS_PROMPT);
    }

    #[tokio::test]
    async fn test_missing_response_field_is_protocol_error() {
        let host = spawn(json!({ "error": "model not loaded" }), Arc::default()).await;

        let err = captioner(host).caption_bytes(b"img").await.unwrap_err();
        assert!(matches!(err, CaptionError::Protocol(_)), "got {err}");
    }

    #[tokio::test]
    async fn test_blank_response_is_empty_error() {
        let host = spawn(json!({ "response": "   " }), Arc::default()).await;

        let err = captioner(host).caption_bytes(b"img").await.unwrap_err();
        assert!(matches!(err, CaptionError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_missing_image_is_not_found() {
        let err = captioner("http://127.0.0.1:9".into())
            .caption(Path::new("/nonexistent/frame.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, CaptionError::NotFound(_)));
    }
}
