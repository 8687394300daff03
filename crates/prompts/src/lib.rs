//! # prompts - text prompts for render batches
//!
//! Prompt catalogs pair element pools (`color`, `subject`, ...) with
//! templates such as `"{subject} in {color_1} and {color_2}"`; the resolver
//! fills them. For image-to-video work the caption client asks a vision
//! model to describe a still instead.

pub mod caption;
pub mod catalog;
pub mod error;
pub mod resolver;

pub use caption::{CaptionConfig, CaptionService, OllamaCaptioner, DEFAULT_ANALYSIS_PROMPT};
pub use catalog::{
    list_template_files, ElementCategory, GeneratedPrompt, PromptCatalog, TemplateInfo,
    DEFAULT_CATALOG_FILE,
};
pub use error::{CaptionError, PromptError};
pub use resolver::{resolve, Pools, Resolution};
