use thiserror::Error;

/// Everything that can go wrong while reporting a batch.
///
/// None of these ever reach the host page: the collector logs them and keeps
/// the buffer intact.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Connection refused, DNS failure, timeout, ...
    #[error("request to metrics endpoint failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint answered, but not with a 2xx.
    #[error("metrics endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to serialize metrics payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Used by in-process transports (tests, custom sinks).
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
