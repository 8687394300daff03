use std::path::PathBuf;

/// Failures raised while driving a render job.
///
/// A job that simply has not produced output yet is never an error: the
/// history read returns `None` for that case and only the poll deadline turns
/// it into [`ComfyError::Timeout`].
#[derive(Debug, thiserror::Error)]
pub enum ComfyError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("ComfyUI returned {status} for {url}: {body}")]
    Transport {
        status: u16,
        url: String,
        body: String,
    },

    #[error("ComfyUI not reachable at {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected ComfyUI response: {0}")]
    Protocol(String),

    #[error("Job {job_id} produced no output within {elapsed_secs:.1}s")]
    Timeout { job_id: String, elapsed_secs: f64 },

    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ComfyError {
    /// True for failures of the HTTP exchange itself, as opposed to local or
    /// semantic problems.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Connection { .. })
    }
}

pub type Result<T, E = ComfyError> = std::result::Result<T, E>;
