use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Artifact categories ComfyUI reports per output node
pub const ARTIFACT_CATEGORIES: [&str; 3] = ["images", "gifs", "videos"];

/// One file produced by a job, as addressed by the `/view` endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArtifactDescriptor {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_storage")]
    pub storage: String,
}

fn default_storage() -> String {
    "output".to_string()
}

impl ArtifactDescriptor {
    /// Final path component of the reported filename
    pub fn basename(&self) -> &str {
        self.filename
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.filename)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NodeOutput {
    #[serde(
        default,
        deserialize_with = "lenient_descriptors",
        skip_serializing_if = "Option::is_none"
    )]
    pub images: Option<Vec<ArtifactDescriptor>>,
    /// Animations; VideoHelperSuite reports its output under this key
    #[serde(
        default,
        deserialize_with = "lenient_descriptors",
        skip_serializing_if = "Option::is_none"
    )]
    pub gifs: Option<Vec<ArtifactDescriptor>>,
    #[serde(
        default,
        deserialize_with = "lenient_descriptors",
        skip_serializing_if = "Option::is_none"
    )]
    pub videos: Option<Vec<ArtifactDescriptor>>,
}

/// Keeps the entries that parse and carry a filename; one malformed entry
/// must not hide the rest of the job's output.
fn lenient_descriptors<'de, D>(deserializer: D) -> Result<Option<Vec<ArtifactDescriptor>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|item| serde_json::from_value::<ArtifactDescriptor>(item).ok())
                .filter(|d| !d.filename.is_empty())
                .collect(),
        ),
        _ => Some(Vec::new()),
    })
}

impl NodeOutput {
    pub fn has_artifact_category(&self) -> bool {
        self.images.is_some() || self.gifs.is_some() || self.videos.is_some()
    }

    /// Categories in fixed order: images, animations, videos
    pub fn categories(&self) -> [(&'static str, &[ArtifactDescriptor]); 3] {
        [
            (ARTIFACT_CATEGORIES[0], self.images.as_deref().unwrap_or_default()),
            (ARTIFACT_CATEGORIES[1], self.gifs.as_deref().unwrap_or_default()),
            (ARTIFACT_CATEGORIES[2], self.videos.as_deref().unwrap_or_default()),
        ]
    }
}

/// The `status` block of a history entry; informational only
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct JobStatus {
    #[serde(default)]
    pub status_str: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

/// History entry for one job: node id → produced artifacts
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CompletionRecord {
    #[serde(default)]
    pub outputs: BTreeMap<String, NodeOutput>,
    #[serde(default)]
    pub status: Option<JobStatus>,
}

impl CompletionRecord {
    /// Complete once at least one node reports an artifact category.
    pub fn is_complete(&self) -> bool {
        self.outputs.values().any(NodeOutput::has_artifact_category)
    }

    /// Every descriptor in discovery order: node, then category, then list.
    pub fn descriptors(&self) -> Vec<&ArtifactDescriptor> {
        self.outputs
            .values()
            .flat_map(|node| node.categories())
            .flat_map(|(_, items)| items.iter())
            .collect()
    }

    /// Pulls the entry for `job_id` out of a history body. Accepts the
    /// `{job_id: entry}` wrapper as well as a bare entry. Anything that does
    /// not parse is treated as absent.
    pub fn from_history(body: &Value, job_id: &str) -> Option<Self> {
        let entry = match body.get(job_id) {
            Some(entry) => entry,
            None if body.get("outputs").is_some() => body,
            None => return None,
        };
        let entry = entry.as_object()?;

        // nodes are parsed one by one so an odd node cannot void the record
        let outputs: BTreeMap<String, NodeOutput> = entry
            .get("outputs")
            .and_then(Value::as_object)
            .map(|nodes| {
                nodes
                    .iter()
                    .filter_map(|(id, node)| {
                        serde_json::from_value::<NodeOutput>(node.clone())
                            .ok()
                            .map(|output| (id.clone(), output))
                    })
                    .collect()
            })
            .unwrap_or_default();
        let status: Option<JobStatus> = entry
            .get("status")
            .and_then(|status| serde_json::from_value(status.clone()).ok());

        Some(Self { outputs, status })
    }
}
