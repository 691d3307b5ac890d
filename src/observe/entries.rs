use serde::{Deserialize, Serialize};

/// Entry types the performance observer subscribes to. Anything else on the
/// feed is ignored.
pub const OBSERVED_ENTRY_TYPES: &[&str] = &["paint", "largest-contentful-paint", "first-input"];

/// A `PerformanceEntry` delivered by the host's performance observer.
/// Recorded under `performance` exactly as it serializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceEntry {
    pub name: String,
    pub duration: f64,
    pub start_time: f64,
    pub entry_type: String,
}

impl PerformanceEntry {
    pub fn is_observed(&self) -> bool {
        OBSERVED_ENTRY_TYPES.contains(&self.entry_type.as_str())
    }
}

/// One resource-timing entry from the host's snapshot at install time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTiming {
    pub name: String,
    pub duration: f64,
    pub transfer_size: u64,
    pub initiator_type: String,
}

/// What a resource entry looks like in the `network` category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkSample<'a> {
    pub name: &'a str,
    pub duration: f64,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: &'a str,
}

impl<'a> From<&'a ResourceTiming> for NetworkSample<'a> {
    fn from(r: &'a ResourceTiming) -> Self {
        Self {
            name: &r.name,
            duration: r.duration,
            size: r.transfer_size,
            kind: &r.initiator_type,
        }
    }
}

/// An uncaught script error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub message: String,
    pub filename: String,
    pub lineno: u32,
    pub colno: u32,
}
