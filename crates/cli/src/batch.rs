//! Sequential batch execution with per-item failure isolation
//!
//! One item runs to completion before the next starts. An item error is
//! recorded in the report and the batch moves on.

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::output::OutputHandler;

/// What a successful item produced
#[derive(Debug, Clone, Default)]
pub struct ItemResult {
    pub output: Option<PathBuf>,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub label: String,
    pub success: bool,
    pub error: Option<String>,
    pub elapsed: Duration,
    pub output: Option<PathBuf>,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub items: Vec<ItemOutcome>,
    pub total: Duration,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.success).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }

    /// Mean wall time of the successful items
    pub fn average_success_time(&self) -> Option<Duration> {
        let succeeded = self.succeeded();
        if succeeded == 0 {
            return None;
        }
        let sum: Duration = self
            .items
            .iter()
            .filter(|i| i.success)
            .map(|i| i.elapsed)
            .sum();
        Some(sum / succeeded as u32)
    }
}

/// One kind of batch work, e.g. "render an image from a random prompt".
#[async_trait]
pub trait BatchJob: Send {
    type Item: Send;

    fn label(&self, index: usize, item: &Self::Item) -> String;

    async fn run(&mut self, index: usize, item: Self::Item) -> anyhow::Result<ItemResult>;
}

pub async fn run_batch<J: BatchJob>(
    job: &mut J,
    items: Vec<J::Item>,
    output: &OutputHandler,
) -> BatchReport {
    let total = items.len();
    let started = Instant::now();
    let mut outcomes = Vec::with_capacity(total);

    for (index, item) in items.into_iter().enumerate() {
        let label = job.label(index, &item);
        output.print_item_start(index + 1, total, &label);

        let item_started = Instant::now();
        let result = job.run(index, item).await;
        let elapsed = item_started.elapsed();

        let outcome = match result {
            Ok(done) => {
                info!("{} finished in {:.1}s", label, elapsed.as_secs_f64());
                output.print_item_success(elapsed, done.output.as_deref());
                ItemOutcome {
                    label,
                    success: true,
                    error: None,
                    elapsed,
                    output: done.output,
                    prompt: done.prompt,
                }
            }
            Err(e) => {
                let message = format!("{e:#}");
                warn!("{} failed after {:.1}s: {}", label, elapsed.as_secs_f64(), message);
                output.print_error(&message);
                ItemOutcome {
                    label,
                    success: false,
                    error: Some(message),
                    elapsed,
                    output: None,
                    prompt: None,
                }
            }
        };
        outcomes.push(outcome);
    }

    BatchReport {
        items: outcomes,
        total: started.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fails every item whose value is odd.
    struct EvenOnly {
        seen: Vec<usize>,
    }

    #[async_trait]
    impl BatchJob for EvenOnly {
        type Item = u32;

        fn label(&self, index: usize, item: &u32) -> String {
            format!("item {index} ({item})")
        }

        async fn run(&mut self, index: usize, item: u32) -> anyhow::Result<ItemResult> {
            self.seen.push(index);
            tokio::time::sleep(Duration::from_millis(5)).await;
            if item % 2 == 1 {
                anyhow::bail!("odd value {item}");
            }
            Ok(ItemResult {
                output: Some(PathBuf::from(format!("out/{item}.png"))),
                prompt: Some(format!("prompt {item}")),
            })
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_batch() {
        let mut job = EvenOnly { seen: Vec::new() };
        let report = run_batch(&mut job, vec![2, 3, 4, 5], &OutputHandler::new(true)).await;

        assert_eq!(job.seen, vec![0, 1, 2, 3]);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 2);
        assert!(!report.all_succeeded());

        let failed = &report.items[1];
        assert_eq!(failed.label, "item 1 (3)");
        assert_eq!(failed.error.as_deref(), Some("odd value 3"));
        assert!(failed.output.is_none());

        let done = &report.items[2];
        assert_eq!(done.output, Some(PathBuf::from("out/4.png")));
        assert_eq!(done.prompt.as_deref(), Some("prompt 4"));
        assert!(report.total >= Duration::from_millis(20));
    }

    #[test]
    fn test_average_counts_only_successes() {
        let item = |success: bool, millis: u64| ItemOutcome {
            label: String::new(),
            success,
            error: None,
            elapsed: Duration::from_millis(millis),
            output: None,
            prompt: None,
        };
        let report = BatchReport {
            items: vec![item(true, 1000), item(false, 9000), item(true, 3000)],
            total: Duration::from_secs(13),
        };

        assert_eq!(report.average_success_time(), Some(Duration::from_millis(2000)));
        assert_eq!(BatchReport::default().average_success_time(), None);
        assert!(BatchReport::default().all_succeeded());
    }
}
