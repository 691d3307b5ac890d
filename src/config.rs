use serde::Deserialize;
use std::time::Duration;

use crate::error::{Result, TelemetryError};

// ─── Collector configuration ─────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Where batches are POSTed.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Anti-forgery token sent as `X-CSRFToken` (the page's
    /// `csrfmiddlewaretoken` field). Omitted from the request when unset.
    #[serde(default)]
    pub csrf_token: Option<String>,

    /// Buffer length at which a category is flushed.
    #[serde(default = "default_threshold")]
    pub threshold: usize,

    /// Per-request timeout; a hung request counts as a failed attempt.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8000/api/metrics/".into()
}
fn default_threshold() -> usize {
    10
}
fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            csrf_token: None,
            threshold: default_threshold(),
            request_timeout_ms: default_request_timeout_ms(),
            retry: RetryPolicy::default(),
        }
    }
}

impl CollectorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(TelemetryError::Config("endpoint must not be empty".into()));
        }
        if self.threshold == 0 {
            return Err(TelemetryError::Config(
                "threshold must be at least 1".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(TelemetryError::Config(
                "request_timeout_ms must be at least 1".into(),
            ));
        }
        self.retry.validate()
    }
}

// ─── Retry policy ────────────────────────────────────────────────

/// Exponential backoff between failed flush attempts of one category.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryPolicy {
    /// Attempts per flush cycle, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on any single delay, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Growth factor applied to the delay after each failed retry.
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_multiplier() -> u32 {
    2
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// No retries: one attempt per threshold crossing.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait before retry number `retry` (1-based), or `None` once
    /// the attempt budget is spent.
    pub fn backoff(&self, retry: u32) -> Option<Duration> {
        if retry == 0 || retry >= self.max_attempts {
            return None;
        }
        let factor = (self.multiplier as u64).saturating_pow(retry - 1);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Some(Duration::from_millis(ms))
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(TelemetryError::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.multiplier == 0 {
            return Err(TelemetryError::Config(
                "retry.multiplier must be at least 1".into(),
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(TelemetryError::Config(
                "retry.initial_backoff_ms exceeds retry.max_backoff_ms".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_page_script() {
        let cfg: CollectorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.threshold, 10);
        assert_eq!(cfg.endpoint, "http://127.0.0.1:8000/api/metrics/");
        assert!(cfg.csrf_token.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_backoff_ms: 500,
            max_backoff_ms: 3_000,
            multiplier: 2,
        };
        let delays: Vec<_> = (1..6)
            .map(|n| policy.backoff(n).unwrap().as_millis())
            .collect();
        assert_eq!(delays, vec![500, 1_000, 2_000, 3_000, 3_000]);
        assert_eq!(policy.backoff(6), None);
    }

    #[test]
    fn disabled_policy_never_retries() {
        assert_eq!(RetryPolicy::disabled().backoff(1), None);
    }

    #[test]
    fn rejects_zero_threshold() {
        let cfg = CollectorConfig {
            threshold: 0,
            ..CollectorConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(TelemetryError::Config(_))));
    }

    #[test]
    fn rejects_inverted_backoff_bounds() {
        let cfg: CollectorConfig = serde_json::from_str(
            r#"{"retry": {"initial_backoff_ms": 5000, "max_backoff_ms": 100}}"#,
        )
        .unwrap();
        assert!(cfg.validate().is_err());
    }
}
