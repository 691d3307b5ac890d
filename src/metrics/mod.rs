pub mod buffer;
pub mod collector;

pub use buffer::{Batch, MetricBuffer};
pub use collector::{CategoryStats, CollectorStats, FlushOutcome, MetricsCollector};

use serde::Serialize;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;

/// Key under which the capture time is stored inside every sample.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Name of a metric bucket. Any string works; the observation adapters use
/// the four constants below.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Category(Cow<'static, str>);

impl Category {
    pub const PERFORMANCE: Category = Category(Cow::Borrowed("performance"));
    pub const NETWORK: Category = Category(Cow::Borrowed("network"));
    pub const ERROR: Category = Category(Cow::Borrowed("error"));
    pub const PAGE: Category = Category(Cow::Borrowed("page"));

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Category {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Category {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

/// One recorded observation: the caller's fields plus the capture timestamp.
/// This is the "write" side; once built it is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Sample {
    fields: Map<String, Value>,
}

impl Sample {
    /// Stamp `data` with `timestamp`. A caller-supplied `timestamp` field is
    /// overwritten.
    pub fn new(mut data: Map<String, Value>, timestamp: String) -> Self {
        data.insert(TIMESTAMP_FIELD.to_owned(), Value::String(timestamp));
        Self { fields: data }
    }

    pub fn timestamp(&self) -> &str {
        self.fields
            .get(TIMESTAMP_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Body of one POST to the ingestion endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Payload {
    pub category: Category,
    pub metrics: Vec<Sample>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn injected_timestamp_wins() {
        let data = json!({"message": "boom", "timestamp": "caller"});
        let Value::Object(map) = data else { unreachable!() };
        let sample = Sample::new(map, "2024-05-01T12:00:00.000Z".into());
        assert_eq!(sample.timestamp(), "2024-05-01T12:00:00.000Z");
        assert_eq!(sample.get("message"), Some(&json!("boom")));
    }

    #[test]
    fn payload_wire_shape() {
        let Value::Object(map) = json!({"name": "first-paint", "duration": 0}) else {
            unreachable!()
        };
        let payload = Payload {
            category: Category::PERFORMANCE,
            metrics: vec![Sample::new(map, "2024-05-01T12:00:00.000Z".into())],
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "category": "performance",
                "metrics": [{
                    "name": "first-paint",
                    "duration": 0,
                    "timestamp": "2024-05-01T12:00:00.000Z"
                }]
            })
        );
    }

    #[test]
    fn custom_category_equals_constant_by_name() {
        assert_eq!(Category::from("error"), Category::ERROR);
        assert_eq!(Category::new("custom").to_string(), "custom");
    }
}
