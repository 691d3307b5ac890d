//! Batched reporting of frontend performance metrics.
//!
//! Host signals (paint timings, resource timings, script errors, load
//! timing) are normalized into samples by [`observe`], buffered per category
//! by [`MetricsCollector`], and POSTed to an ingestion endpoint in batches.

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod observe;
pub mod simulator;
pub mod transport;

pub use config::{CollectorConfig, RetryPolicy};
pub use error::TelemetryError;
pub use metrics::{Category, FlushOutcome, MetricsCollector, Sample};
pub use observe::{Monitor, ObservationSources};
pub use transport::{HttpTransport, Transport};
