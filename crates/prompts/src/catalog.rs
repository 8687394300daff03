//! Prompt catalog files
//!
//! A catalog is a JSON document with two sections:
//!
//! ```json
//! {
//!   "elements": { "color": { "description": "...", "values": ["red", "blue"] } },
//!   "templates": { "abstract_art": { "description": "...", "japanese_description": "...", "text": "{color_1} and {color_2}" } }
//! }
//! ```

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rand::{seq::IteratorRandom, Rng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::PromptError,
    resolver::{resolve, Pools},
};

pub const DEFAULT_CATALOG_FILE: &str = "prompt_elements.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementCategory {
    #[serde(default)]
    pub description: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateInfo {
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "japanese_description")]
    pub localized_description: Option<String>,
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    elements: IndexMap<String, ElementCategory>,
    #[serde(default)]
    templates: IndexMap<String, TemplateInfo>,
}

/// One generated prompt
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPrompt {
    pub template: String,
    pub text: String,
    /// Slots the catalog could not fill
    pub missing: Vec<String>,
}

/// Loaded catalog: element pools plus named templates. Names keep the
/// order they have in the file.
#[derive(Debug, Clone, Default)]
pub struct PromptCatalog {
    elements: IndexMap<String, ElementCategory>,
    templates: IndexMap<String, TemplateInfo>,
    pools: Pools,
}

impl PromptCatalog {
    pub fn new(
        elements: IndexMap<String, ElementCategory>,
        templates: IndexMap<String, TemplateInfo>,
    ) -> Self {
        let pools = elements
            .iter()
            .map(|(name, category)| (name.clone(), category.values.clone()))
            .collect();
        Self {
            elements,
            templates,
            pools,
        }
    }

    pub fn from_json_str(data: &str, origin: &Path) -> Result<Self, PromptError> {
        let file: CatalogFile = serde_json::from_str(data).map_err(|source| PromptError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        Ok(Self::new(file.elements, file.templates))
    }

    pub async fn load(path: &Path) -> Result<Self, PromptError> {
        if !path.exists() {
            return Err(PromptError::CatalogNotFound(path.to_path_buf()));
        }
        let data = tokio::fs::read_to_string(path).await?;
        let catalog = Self::from_json_str(&data, path)?;
        info!(
            "Loaded prompt catalog {} ({} categories, {} templates)",
            path.display(),
            catalog.elements.len(),
            catalog.templates.len()
        );
        Ok(catalog)
    }

    /// Where a catalog argument points: nothing means the default file in
    /// `prompts_dir`, a bare file name is looked up in `prompts_dir`, any
    /// other path is used as given.
    pub fn resolve_path(prompts_dir: &Path, file: Option<&str>) -> PathBuf {
        match file {
            None => prompts_dir.join(DEFAULT_CATALOG_FILE),
            Some(name) => {
                let path = Path::new(name);
                let is_bare = !path.is_absolute()
                    && path.parent().map_or(true, |p| p.as_os_str().is_empty());
                if is_bare {
                    prompts_dir.join(path)
                } else {
                    path.to_path_buf()
                }
            }
        }
    }

    pub fn template_names(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }

    pub fn template_info(&self, name: &str) -> Option<&TemplateInfo> {
        self.templates.get(name)
    }

    pub fn element_names(&self) -> Vec<String> {
        self.elements.keys().cloned().collect()
    }

    pub fn element_values(&self, name: &str) -> Option<&[String]> {
        self.elements.get(name).map(|c| c.values.as_slice())
    }

    pub fn element(&self, name: &str) -> Option<&ElementCategory> {
        self.elements.get(name)
    }

    /// Fills the named template, or a uniformly chosen one when `name` is
    /// `None`.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        name: Option<&str>,
        rng: &mut R,
    ) -> Result<GeneratedPrompt, PromptError> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self
                .templates
                .keys()
                .choose(rng)
                .cloned()
                .ok_or(PromptError::EmptyCatalog)?,
        };
        if self.templates.is_empty() {
            return Err(PromptError::EmptyCatalog);
        }

        let template = self
            .templates
            .get(&name)
            .ok_or_else(|| PromptError::TemplateNotFound {
                name: name.clone(),
                available: self.template_names(),
            })?;

        let resolution = resolve(&template.text, &self.pools, rng);
        info!(
            "Generated prompt from '{}' ({} chars)",
            name,
            resolution.text.chars().count()
        );
        Ok(GeneratedPrompt {
            template: name,
            text: resolution.text,
            missing: resolution.missing,
        })
    }

    /// `count` prompts; with no name each one picks its own template.
    pub fn generate_many<R: Rng + ?Sized>(
        &self,
        name: Option<&str>,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<GeneratedPrompt>, PromptError> {
        (0..count).map(|_| self.generate(name, rng)).collect()
    }
}

/// Catalog files (`*.json`) in `dir`, sorted by name. A missing directory
/// lists as empty.
pub fn list_template_files(dir: &Path) -> Result<Vec<String>, PromptError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            if let Some(name) = path.file_name() {
                files.push(name.to_string_lossy().to_string());
            }
        }
    }
    files.sort();
    Ok(files)
}
