//! Workflow graph handling
//!
//! A workflow is the node graph ComfyUI executes. Exports come in several
//! shapes, so everything is normalized into an id → node map at load time;
//! after that the graph is treated as an opaque JSON tree and only string
//! leaves carrying sentinel markers are rewritten.

use std::{collections::BTreeMap, path::Path};

use rand::Rng;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ComfyError, Result};

/// Marker replaced by the uploaded input image name
pub const IMAGE_FILENAME_MARKER: &str = "###IMAGE_FILENAME###";
/// Marker replaced by the positive prompt text
pub const PROMPT_MARKER: &str = "###PROMPT###";
/// Marker replaced by the negative prompt text
pub const NEGATIVE_PROMPT_MARKER: &str = "###NEGATIVE_PROMPT###";

/// Marker → replacement text
pub type Substitutions = BTreeMap<String, String>;

/// Returns a copy of `document` with every marker occurrence in every string
/// leaf replaced. Keys, ordering and non-string leaves are left untouched.
pub fn patch(document: &Value, substitutions: &Substitutions) -> Value {
    match document {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), patch(value, substitutions)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| patch(v, substitutions)).collect()),
        Value::String(text) => Value::String(replace_markers(text, substitutions)),
        other => other.clone(),
    }
}

/// Replaces all markers in a single left-to-right pass, so text inserted for
/// one marker is never scanned for another.
fn replace_markers(text: &str, substitutions: &Substitutions) -> String {
    if !substitutions.keys().any(|marker| !marker.is_empty() && text.contains(marker.as_str())) {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while !rest.is_empty() {
        let next = substitutions
            .iter()
            .filter(|(marker, _)| !marker.is_empty())
            .filter_map(|(marker, value)| rest.find(marker.as_str()).map(|at| (at, marker, value)))
            // earliest match wins, longer marker breaks ties
            .min_by(|a, b| a.0.cmp(&b.0).then(b.1.len().cmp(&a.1.len())));

        match next {
            Some((at, marker, value)) => {
                out.push_str(&rest[..at]);
                out.push_str(value);
                rest = &rest[at + marker.len()..];
            }
            None => {
                out.push_str(rest);
                break;
            }
        }
    }
    out
}

/// Canonical id-keyed workflow graph
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    nodes: Map<String, Value>,
}

impl Workflow {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ComfyError::NotFound(path.to_path_buf()));
        }
        let data = tokio::fs::read_to_string(path).await?;
        let value: Value = serde_json::from_str(&data)?;
        let workflow = Self::from_value(value)?;
        debug!("Loaded workflow {} with {} nodes", path.display(), workflow.len());
        Ok(workflow)
    }

    /// Normalizes the accepted export shapes: an id-keyed map, an object
    /// holding `nodes` (array or map), or a bare array of nodes with `id`.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(mut map) => match map.remove("nodes") {
                Some(Value::Array(nodes)) => Self::from_node_list(nodes),
                Some(Value::Object(nodes)) => Ok(Self { nodes }),
                Some(other) => {
                    map.insert("nodes".into(), other);
                    Ok(Self { nodes: map })
                }
                None => Ok(Self { nodes: map }),
            },
            Value::Array(nodes) => Self::from_node_list(nodes),
            other => Err(ComfyError::InvalidWorkflow(format!(
                "expected an object or array at the top level, found {}",
                type_name(&other)
            ))),
        }
    }

    fn from_node_list(nodes: Vec<Value>) -> Result<Self> {
        let mut map = Map::new();
        for (index, node) in nodes.into_iter().enumerate() {
            let id = match node.get("id") {
                Some(Value::String(id)) => id.clone(),
                Some(Value::Number(id)) => id.to_string(),
                _ => {
                    return Err(ComfyError::InvalidWorkflow(format!(
                        "node at position {index} has no id"
                    )))
                }
            };
            map.insert(id, node);
        }
        Ok(Self { nodes: map })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Value> {
        self.nodes.get(id)
    }

    /// Patched copy; the template stays reusable across jobs.
    pub fn patched(&self, substitutions: &Substitutions) -> Self {
        let nodes = self
            .nodes
            .iter()
            .map(|(id, node)| (id.clone(), patch(node, substitutions)))
            .collect();
        Self { nodes }
    }

    /// Writes sampler settings into the bound nodes' `inputs`. Nodes that do
    /// not exist in this graph are skipped. Returns the seed actually used.
    pub fn apply_sampler(&mut self, settings: &SamplerSettings, bindings: &NodeBindings) -> u64 {
        let seed = settings
            .seed
            .unwrap_or_else(|| rand::thread_rng().gen_range(0..=u32::MAX as u64));

        if let Some(text) = &settings.positive_prompt {
            self.set_input(&bindings.positive, "text", Value::String(text.clone()));
        }
        if let Some(text) = &settings.negative_prompt {
            self.set_input(&bindings.negative, "text", Value::String(text.clone()));
        }
        self.set_input(&bindings.sampler, "seed", Value::from(seed));
        self.set_input(&bindings.sampler, "steps", Value::from(settings.steps));
        self.set_input(&bindings.sampler, "cfg", Value::from(settings.cfg));
        self.set_input(&bindings.latent, "width", Value::from(settings.width));
        self.set_input(&bindings.latent, "height", Value::from(settings.height));
        seed
    }

    fn set_input(&mut self, node_id: &str, key: &str, value: Value) {
        let Some(inputs) = self
            .nodes
            .get_mut(node_id)
            .and_then(|node| node.get_mut("inputs"))
            .and_then(Value::as_object_mut)
        else {
            return;
        };
        inputs.insert(key.to_string(), value);
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.nodes.clone())
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Sampling parameters written into an API-format workflow
#[derive(Debug, Clone)]
pub struct SamplerSettings {
    pub positive_prompt: Option<String>,
    pub negative_prompt: Option<String>,
    /// `None` draws a fresh random seed
    pub seed: Option<u64>,
    pub steps: u32,
    pub cfg: f64,
    pub width: u32,
    pub height: u32,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            positive_prompt: None,
            negative_prompt: None,
            seed: None,
            steps: 30,
            cfg: 5.45,
            width: 1024,
            height: 1024,
        }
    }
}

/// Which node ids carry the sampler, prompt and latent-size inputs
#[derive(Debug, Clone)]
pub struct NodeBindings {
    pub sampler: String,
    pub positive: String,
    pub negative: String,
    pub latent: String,
}

impl Default for NodeBindings {
    fn default() -> Self {
        // ids used by the SD3.5 turbo export
        Self {
            sampler: "3".into(),
            positive: "16".into(),
            negative: "54".into(),
            latent: "53".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn markers(image: &str, prompt: &str) -> Substitutions {
        Substitutions::from([
            (IMAGE_FILENAME_MARKER.to_string(), image.to_string()),
            (PROMPT_MARKER.to_string(), prompt.to_string()),
        ])
    }

    #[test]
    fn test_patch_without_markers_is_unchanged() {
        let doc = json!({
            "3": { "class_type": "KSampler", "inputs": { "seed": 7, "cfg": 5.5, "denoise": true, "model": ["4", 0] } },
            "9": { "class_type": "SaveImage", "inputs": { "filename_prefix": "ComfyUI", "extra": null } }
        });
        assert_eq!(patch(&doc, &markers("a.png", "a dragon")), doc);
    }

    #[test]
    fn test_patch_replaces_both_markers_in_one_leaf() {
        let doc = json!({ "n": { "inputs": { "text": "###PROMPT### from ###IMAGE_FILENAME###, again ###PROMPT###" } } });
        let patched = patch(&doc, &markers("cat.jpg", "a cat"));
        assert_eq!(patched["n"]["inputs"]["text"], "a cat from cat.jpg, again a cat");

        let reversed = json!(["###IMAGE_FILENAME######PROMPT###"]);
        assert_eq!(patch(&reversed, &markers("x.png", "y"))[0], "x.pngy");
    }

    #[test]
    fn test_patch_does_not_rescan_inserted_text() {
        let doc = json!("###PROMPT###");
        let patched = patch(&doc, &markers("img.png", "see ###IMAGE_FILENAME###"));
        assert_eq!(patched, json!("see ###IMAGE_FILENAME###"));
    }

    #[test]
    fn test_patch_walks_arrays_in_order() {
        let doc = json!([1, "###PROMPT###", [false, "###IMAGE_FILENAME###"]]);
        assert_eq!(patch(&doc, &markers("i.png", "p")), json!([1, "p", [false, "i.png"]]));
    }

    #[test]
    fn test_from_value_accepts_node_list() {
        let value = json!({ "nodes": [ { "id": 97, "type": "LoadImage" }, { "id": "93", "type": "CLIPTextEncode" } ] });
        let workflow = Workflow::from_value(value).unwrap();
        assert_eq!(workflow.len(), 2);
        assert_eq!(workflow.node("97").unwrap()["type"], "LoadImage");
        assert!(workflow.node("93").is_some());
    }

    #[test]
    fn test_from_value_rejects_nodes_without_id() {
        let err = Workflow::from_value(json!([{ "type": "LoadImage" }])).unwrap_err();
        assert!(matches!(err, ComfyError::InvalidWorkflow(_)));
        assert!(Workflow::from_value(json!("graph")).is_err());
    }

    #[test]
    fn test_apply_sampler_skips_missing_nodes() {
        let mut workflow = Workflow::from_value(json!({
            "3": { "inputs": { "seed": 0, "steps": 1, "cfg": 1.0 } },
            "16": { "inputs": { "text": "" } }
        }))
        .unwrap();
        let settings = SamplerSettings {
            positive_prompt: Some("lake at dawn".into()),
            negative_prompt: Some("blurry".into()),
            seed: Some(42),
            ..Default::default()
        };
        let seed = workflow.apply_sampler(&settings, &NodeBindings::default());

        assert_eq!(seed, 42);
        assert_eq!(workflow.node("3").unwrap()["inputs"]["steps"], 30);
        assert_eq!(workflow.node("3").unwrap()["inputs"]["seed"], 42);
        assert_eq!(workflow.node("16").unwrap()["inputs"]["text"], "lake at dawn");
        assert!(workflow.node("54").is_none());
    }

    #[test]
    fn test_random_seed_fits_u32() {
        let mut workflow = Workflow::from_value(json!({})).unwrap();
        let seed = workflow.apply_sampler(&SamplerSettings::default(), &NodeBindings::default());
        assert!(seed <= u32::MAX as u64);
    }
}
