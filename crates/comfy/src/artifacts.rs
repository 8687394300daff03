use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use tokio::fs;
use tracing::{info, warn};

use crate::{
    client::JobBackend,
    error::{ComfyError, Result},
    record::{ArtifactDescriptor, CompletionRecord},
};

/// `name`, or `<stem>_<n>.<ext>` with the smallest `n` not yet in `used`.
fn unique_name(name: &str, used: &HashSet<String>) -> String {
    if !used.contains(name) {
        return name.to_string();
    }
    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    (1..)
        .map(|n| match extension {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        })
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

/// Downloads the files a finished job reports.
pub struct ArtifactResolver<'a, B: JobBackend + ?Sized> {
    backend: &'a B,
}

impl<'a, B: JobBackend + ?Sized> ArtifactResolver<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Fetches every descriptor in `record` into `destination`, named by the
    /// basename of the reported file. Basenames repeated across subfolders
    /// get a numeric suffix. Paths come back in discovery order.
    /// An empty record yields an empty list; deciding whether that is a
    /// failure is up to the caller.
    pub async fn collect_and_download(
        &self,
        record: &CompletionRecord,
        destination: &Path,
    ) -> Result<Vec<PathBuf>> {
        let descriptors = record.descriptors();
        if descriptors.is_empty() {
            warn!("Completion record lists no artifacts");
            return Ok(Vec::new());
        }

        fs::create_dir_all(destination).await?;

        let mut saved = Vec::with_capacity(descriptors.len());
        let mut used = HashSet::new();
        for descriptor in descriptors {
            let basename = descriptor.basename();
            let name = unique_name(basename, &used);
            if name != basename {
                warn!(
                    "{} already downloaded in this job, saving {}/{} as {}",
                    basename, descriptor.subfolder, descriptor.filename, name
                );
            }
            let target = destination.join(&name);
            used.insert(name);
            let bytes = self.backend.fetch_artifact(descriptor).await?;
            fs::write(&target, &bytes).await?;
            info!("Saved {} ({} bytes)", target.display(), bytes.len());
            saved.push(target);
        }
        Ok(saved)
    }

    /// Bytes of the first reported artifact, if any.
    pub async fn fetch_first(&self, record: &CompletionRecord) -> Result<(ArtifactDescriptor, Vec<u8>)> {
        let descriptor = record
            .descriptors()
            .first()
            .map(|d| (*d).clone())
            .ok_or_else(|| ComfyError::Protocol("no artifacts found in job output".into()))?;
        let bytes = self.backend.fetch_artifact(&descriptor).await?;
        Ok((descriptor, bytes))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::graph::Workflow;

    /// Serves the filename itself as the artifact body.
    struct EchoBackend;

    #[async_trait]
    impl JobBackend for EchoBackend {
        async fn upload(&self, _bytes: Vec<u8>, name: &str) -> Result<String> {
            Ok(name.to_string())
        }

        async fn submit(&self, _workflow: &Workflow) -> Result<String> {
            Ok("job".into())
        }

        async fn fetch_history(&self, _job_id: &str) -> Result<Option<CompletionRecord>> {
            Ok(None)
        }

        async fn fetch_artifact(&self, descriptor: &ArtifactDescriptor) -> Result<Vec<u8>> {
            if descriptor.filename.starts_with("missing") {
                return Err(ComfyError::Transport {
                    status: 404,
                    url: "http://fake/view".into(),
                    body: "not found".into(),
                });
            }
            Ok(format!("{}:{}", descriptor.subfolder, descriptor.filename).into_bytes())
        }
    }

    fn record(body: serde_json::Value) -> CompletionRecord {
        CompletionRecord::from_history(&body, "job").unwrap()
    }

    #[tokio::test]
    async fn test_downloads_one_file_per_node() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("nested/out");
        let record = record(json!({
            "outputs": {
                "10": { "images": [ { "filename": "first.png", "subfolder": "" } ] },
                "11": { "images": [ { "filename": "second.png", "subfolder": "batch" } ] }
            }
        }));

        let paths = ArtifactResolver::new(&EchoBackend)
            .collect_and_download(&record, &destination)
            .await
            .unwrap();

        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0], destination.join("first.png"));
        assert_eq!(std::fs::read(&paths[0]).unwrap(), b":first.png");
        assert_eq!(std::fs::read(&paths[1]).unwrap(), b"batch:second.png");
    }

    #[tokio::test]
    async fn test_repeated_basenames_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let record = record(json!({
            "outputs": {
                "10": { "images": [
                    { "filename": "frame.png", "subfolder": "left" },
                    { "filename": "frame.png", "subfolder": "right" }
                ] },
                "11": { "images": [ { "filename": "frame_1.png", "subfolder": "" } ] }
            }
        }));

        let paths = ArtifactResolver::new(&EchoBackend)
            .collect_and_download(&record, dir.path())
            .await
            .unwrap();

        assert_eq!(
            paths,
            vec![
                dir.path().join("frame.png"),
                dir.path().join("frame_1.png"),
                dir.path().join("frame_1_1.png"),
            ]
        );
        assert_eq!(std::fs::read(&paths[0]).unwrap(), b"left:frame.png");
        assert_eq!(std::fs::read(&paths[1]).unwrap(), b"right:frame.png");
        assert_eq!(std::fs::read(&paths[2]).unwrap(), b":frame_1.png");
    }

    #[test]
    fn test_unique_name_without_extension() {
        let used = HashSet::from(["clip".to_string(), "clip_1".to_string()]);
        assert_eq!(unique_name("clip", &used), "clip_2");
        assert_eq!(unique_name("other.gif", &used), "other.gif");
    }

    #[tokio::test]
    async fn test_empty_record_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let record = record(json!({ "outputs": { "4": { "images": [] } } }));

        let paths = ArtifactResolver::new(&EchoBackend)
            .collect_and_download(&record, dir.path())
            .await
            .unwrap();
        assert!(paths.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let record = record(json!({ "outputs": { "4": { "videos": [ { "filename": "missing.mp4" } ] } } }));

        let err = ArtifactResolver::new(&EchoBackend)
            .collect_and_download(&record, dir.path())
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_fetch_first_requires_an_artifact() {
        let empty = record(json!({ "outputs": { "4": { "gifs": [] } } }));
        let err = ArtifactResolver::new(&EchoBackend).fetch_first(&empty).await.unwrap_err();
        assert!(matches!(err, ComfyError::Protocol(_)));
    }
}
