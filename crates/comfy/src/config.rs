use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8188";

/// Connection and timing settings for one ComfyUI instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComfyConfig {
    pub base_url: String,
    /// Sleep between two history reads
    pub poll_interval: Duration,
    /// Wall-clock budget for a job to show output
    pub poll_timeout: Duration,
    /// Budget for submitting a workflow
    pub request_timeout: Duration,
    /// Budget for a single upload or artifact download
    pub transfer_timeout: Duration,
    /// Budget for a single history read
    pub history_timeout: Duration,
    /// Sent with every submission so the server can attribute jobs
    pub client_id: Uuid,
}

impl Default for ComfyConfig {
    fn default() -> Self {
        let base_url = std::env::var("COMFY_HOST").unwrap_or_else(|_| DEFAULT_BASE_URL.into());

        Self {
            base_url: normalize_base_url(&base_url),
            poll_interval: std::env::var("COMFY_POLL_INTERVAL")
                .ok()
                .and_then(|v| v.trim().parse::<f64>().ok())
                .and_then(positive_secs)
                .unwrap_or(Duration::from_millis(1500)),
            poll_timeout: std::env::var("COMFY_TIMEOUT")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(600)),
            request_timeout: Duration::from_secs(120),
            transfer_timeout: Duration::from_secs(120),
            history_timeout: Duration::from_secs(30),
            client_id: Uuid::new_v4(),
        }
    }
}

impl ComfyConfig {
    pub fn with_base_url(mut self, address: &str) -> Self {
        self.base_url = normalize_base_url(address);
        self
    }

    pub fn with_poll(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// A duration from fractional seconds, or `None` unless `secs` is finite and
/// greater than zero.
pub fn positive_secs(secs: f64) -> Option<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

/// Accepts `host:port` as well as full URLs and strips trailing slashes.
pub fn normalize_base_url(address: &str) -> String {
    let trimmed = address.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_adds_scheme() {
        assert_eq!(normalize_base_url("127.0.0.1:8000"), "http://127.0.0.1:8000");
        assert_eq!(normalize_base_url("https://render.local/"), "https://render.local");
    }

    #[test]
    fn test_positive_secs_rejects_unusable_values() {
        assert_eq!(positive_secs(2.5), Some(Duration::from_millis(2500)));
        assert_eq!(positive_secs(-1.0), None);
        assert_eq!(positive_secs(0.0), None);
        assert_eq!(positive_secs(f64::NAN), None);
        assert_eq!(positive_secs(f64::INFINITY), None);
        assert_eq!(positive_secs(1e30), None);
    }

    #[test]
    fn test_bad_poll_interval_env_falls_back() {
        // only ever set to values that map to the fallback, so concurrent
        // tests reading the default are unaffected
        for value in ["-1", "nan", "inf"] {
            std::env::set_var("COMFY_POLL_INTERVAL", value);
            assert_eq!(ComfyConfig::default().poll_interval, Duration::from_millis(1500));
        }
        std::env::remove_var("COMFY_POLL_INTERVAL");
    }

    #[test]
    fn test_endpoint_joins_single_slash() {
        let config = ComfyConfig::default().with_base_url("http://localhost:8188/");
        assert_eq!(config.endpoint("/history/abc"), "http://localhost:8188/history/abc");
        assert_eq!(config.endpoint("prompt"), "http://localhost:8188/prompt");
    }
}
