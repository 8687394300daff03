use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("Template '{name}' not found. Available templates: {}", .available.join(", "))]
    TemplateNotFound { name: String, available: Vec<String> },

    #[error("No templates available in catalog")]
    EmptyCatalog,

    #[error("Prompt catalog not found: {}", .0.display())]
    CatalogNotFound(PathBuf),

    #[error("Failed to parse prompt catalog {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures of the caption service call
#[derive(Debug, thiserror::Error)]
pub enum CaptionError {
    #[error("Image not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Caption service at {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Unexpected caption response: {0}")]
    Protocol(String),

    #[error("Caption service returned an empty response")]
    EmptyResponse,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
