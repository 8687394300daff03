use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, info};

use crate::{
    client::JobBackend,
    error::{ComfyError, Result},
    record::CompletionRecord,
};

/// Outcome of a single poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    Waiting,
    Ready(CompletionRecord),
    TimedOut { elapsed: Duration },
}

/// Waits for a job's history entry to carry output.
///
/// All state lives in the call, so one poller can serve any number of jobs.
#[derive(Debug, Clone)]
pub struct CompletionPoller {
    interval: Duration,
    timeout: Duration,
}

impl CompletionPoller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Reads history once. The deadline is checked after the read so a job
    /// finishing right at the limit is still picked up.
    pub async fn tick<B: JobBackend + ?Sized>(
        &self,
        backend: &B,
        job_id: &str,
        started: Instant,
    ) -> PollState {
        let record = match backend.fetch_history(job_id).await {
            Ok(record) => record,
            Err(e) => {
                debug!("History read for job {} failed: {}", job_id, e);
                None
            }
        };

        if let Some(record) = record.filter(CompletionRecord::is_complete) {
            return PollState::Ready(record);
        }

        let elapsed = started.elapsed();
        if elapsed > self.timeout {
            PollState::TimedOut { elapsed }
        } else {
            PollState::Waiting
        }
    }

    pub async fn wait<B: JobBackend + ?Sized>(
        &self,
        backend: &B,
        job_id: &str,
    ) -> Result<CompletionRecord> {
        let started = Instant::now();
        let mut polls = 0u32;

        loop {
            polls += 1;
            match self.tick(backend, job_id, started).await {
                PollState::Ready(record) => {
                    info!(
                        "Job {} ready after {} polls ({:.1}s)",
                        job_id,
                        polls,
                        started.elapsed().as_secs_f64()
                    );
                    return Ok(record);
                }
                PollState::TimedOut { elapsed } => {
                    return Err(ComfyError::Timeout {
                        job_id: job_id.to_string(),
                        elapsed_secs: elapsed.as_secs_f64(),
                    });
                }
                PollState::Waiting => sleep(self.interval).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::{graph::Workflow, record::ArtifactDescriptor};

    /// Returns nothing for `absent_polls` reads, then a finished record.
    struct ScriptedBackend {
        absent_polls: usize,
        fail_transport: bool,
        calls: Arc<AtomicUsize>,
    }

    fn finished() -> CompletionRecord {
        CompletionRecord::from_history(
            &json!({ "outputs": { "9": { "images": [ { "filename": "out.png" } ] } } }),
            "job",
        )
        .unwrap()
    }

    #[async_trait]
    impl JobBackend for ScriptedBackend {
        async fn upload(&self, _bytes: Vec<u8>, name: &str) -> Result<String> {
            Ok(name.to_string())
        }

        async fn submit(&self, _workflow: &Workflow) -> Result<String> {
            Ok("job".into())
        }

        async fn fetch_history(&self, _job_id: &str) -> Result<Option<CompletionRecord>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.absent_polls {
                if self.fail_transport {
                    return Err(ComfyError::Transport {
                        status: 502,
                        url: "http://fake/history/job".into(),
                        body: String::new(),
                    });
                }
                return Ok(Some(CompletionRecord::default()));
            }
            Ok(Some(finished()))
        }

        async fn fetch_artifact(&self, _descriptor: &ArtifactDescriptor) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_ready_after_two_absent_polls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = ScriptedBackend {
            absent_polls: 2,
            fail_transport: false,
            calls: calls.clone(),
        };
        let poller = CompletionPoller::new(Duration::from_millis(10), Duration::from_secs(5));

        let record = poller.wait(&backend, "job").await.unwrap();
        assert_eq!(record, finished());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_transport_errors_are_absorbed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = ScriptedBackend {
            absent_polls: 3,
            fail_transport: true,
            calls: calls.clone(),
        };
        let poller = CompletionPoller::new(Duration::from_millis(5), Duration::from_secs(5));

        assert!(poller.wait(&backend, "job").await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_times_out_when_never_ready() {
        let backend = ScriptedBackend {
            absent_polls: usize::MAX,
            fail_transport: false,
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let poller = CompletionPoller::new(Duration::from_millis(500), Duration::from_secs(2));

        let started = Instant::now();
        let err = poller.wait(&backend, "job-42").await.unwrap_err();
        let elapsed = started.elapsed();

        match err {
            ComfyError::Timeout { job_id, elapsed_secs } => {
                assert_eq!(job_id, "job-42");
                assert!(elapsed_secs > 2.0);
            }
            other => panic!("expected timeout, got {other}"),
        }
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_millis(3000));
    }
}
