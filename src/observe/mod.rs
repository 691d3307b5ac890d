//! Adapters from host-emitted signals to collector samples.
//!
//! The host hands over whichever feeds it supports; a missing feed just
//! means that category is never populated.

pub mod entries;
pub mod timing;

pub use entries::{ErrorEvent, NetworkSample, PerformanceEntry, ResourceTiming};
pub use timing::{NavigationTiming, PageTimings};

use std::pin::Pin;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, trace};

use crate::metrics::{Category, MetricsCollector};

/// A push feed of host events.
pub type Feed<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// Everything the host can observe for one page.
#[derive(Default)]
pub struct ObservationSources {
    /// Performance observer (paint, LCP, first input).
    pub performance: Option<Feed<PerformanceEntry>>,
    /// Resource timings already recorded when monitoring starts.
    pub resources: Option<Vec<ResourceTiming>>,
    /// Global error events.
    pub errors: Option<Feed<ErrorEvent>>,
    /// Fires once with the navigation timing after the load event.
    pub load: Option<oneshot::Receiver<NavigationTiming>>,
}

impl ObservationSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_performance<S>(mut self, feed: S) -> Self
    where
        S: Stream<Item = PerformanceEntry> + Send + 'static,
    {
        self.performance = Some(Box::pin(feed));
        self
    }

    pub fn with_resources(mut self, resources: Vec<ResourceTiming>) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn with_errors<S>(mut self, feed: S) -> Self
    where
        S: Stream<Item = ErrorEvent> + Send + 'static,
    {
        self.errors = Some(Box::pin(feed));
        self
    }

    pub fn with_load(mut self, load: oneshot::Receiver<NavigationTiming>) -> Self {
        self.load = Some(load);
        self
    }
}

// ─── Monitor ─────────────────────────────────────────────────────

/// Running observation for one page. Dropping it stops every forwarder.
#[must_use = "dropping a Monitor stops observation immediately"]
pub struct Monitor {
    tasks: Vec<JoinHandle<()>>,
}

impl Monitor {
    /// Wire `sources` into `collector`. Must be called from within a tokio
    /// runtime.
    pub fn install(collector: &MetricsCollector, sources: ObservationSources) -> Self {
        let mut tasks = Vec::new();

        match sources.performance {
            Some(mut feed) => {
                let collector = collector.clone();
                tasks.push(tokio::spawn(async move {
                    while let Some(entry) = feed.next().await {
                        if entry.is_observed() {
                            collector.record(Category::PERFORMANCE, &entry);
                        } else {
                            trace!(entry_type = %entry.entry_type, "ignoring performance entry");
                        }
                    }
                }));
            }
            None => debug!("performance observer unavailable, skipping"),
        }

        match sources.resources {
            Some(resources) => {
                for resource in &resources {
                    collector.record(Category::NETWORK, &NetworkSample::from(resource));
                }
                debug!(count = resources.len(), "recorded resource timing snapshot");
            }
            None => debug!("resource timing unavailable, skipping"),
        }

        match sources.errors {
            Some(mut feed) => {
                let collector = collector.clone();
                tasks.push(tokio::spawn(async move {
                    while let Some(event) = feed.next().await {
                        collector.record(Category::ERROR, &event);
                    }
                }));
            }
            None => debug!("error events unavailable, skipping"),
        }

        match sources.load {
            Some(load) => {
                let collector = collector.clone();
                tasks.push(tokio::spawn(async move {
                    // A dropped sender means the page went away before load.
                    if let Ok(timing) = load.await {
                        collector.record(Category::PAGE, &PageTimings::from(&timing));
                    }
                }));
            }
            None => debug!("navigation timing unavailable, skipping"),
        }

        Self { tasks }
    }

    /// Wait for every feed to close (the host ends them on unload).
    pub async fn finished(mut self) {
        for task in std::mem::take(&mut self.tasks) {
            let _ = task.await;
        }
    }

    /// Stop observing immediately.
    pub fn abort(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CollectorConfig, RetryPolicy};
    use crate::transport::mock::MockTransport;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    fn collector() -> (MetricsCollector, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let config = CollectorConfig {
            retry: RetryPolicy::disabled(),
            ..CollectorConfig::default()
        };
        (MetricsCollector::new(config, transport.clone()), transport)
    }

    fn paint(entry_type: &str) -> PerformanceEntry {
        PerformanceEntry {
            name: "first-paint".into(),
            duration: 0.0,
            start_time: 420.0,
            entry_type: entry_type.into(),
        }
    }

    #[tokio::test]
    async fn missing_sources_create_no_buffers() {
        let (collector, _transport) = collector();
        let monitor = Monitor::install(&collector, ObservationSources::new());
        monitor.finished().await;
        assert!(collector.stats().categories.is_empty());
    }

    #[tokio::test]
    async fn forwards_only_observed_entry_types() {
        let (collector, _transport) = collector();
        let feed = tokio_stream::iter(vec![
            paint("paint"),
            paint("resource"),
            paint("largest-contentful-paint"),
            paint("first-input"),
        ]);
        Monitor::install(&collector, ObservationSources::new().with_performance(feed))
            .finished()
            .await;

        let types: Vec<_> = collector
            .buffered_samples(&Category::PERFORMANCE)
            .iter()
            .map(|s| s.get("entryType").cloned().unwrap())
            .collect();
        assert_eq!(
            types,
            vec![json!("paint"), json!("largest-contentful-paint"), json!("first-input")]
        );
    }

    #[tokio::test]
    async fn resource_snapshot_is_one_shot() {
        let (collector, _transport) = collector();
        let resources = vec![ResourceTiming {
            name: "/static/css/portal.css".into(),
            duration: 12.0,
            transfer_size: 2048,
            initiator_type: "link".into(),
        }];
        let monitor =
            Monitor::install(&collector, ObservationSources::new().with_resources(resources));

        // Recorded synchronously during install.
        let samples = collector.buffered_samples(&Category::NETWORK);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].get("size"), Some(&json!(2048)));
        assert_eq!(samples[0].get("type"), Some(&json!("link")));
        monitor.finished().await;
    }

    #[tokio::test]
    async fn error_events_reach_threshold_and_flush() {
        let (collector, transport) = collector();
        let (tx, rx) = mpsc::unbounded_channel();
        let monitor = Monitor::install(
            &collector,
            ObservationSources::new().with_errors(UnboundedReceiverStream::new(rx)),
        );

        for line in 0..10 {
            tx.send(ErrorEvent {
                message: "TypeError: chart is undefined".into(),
                filename: "/static/js/admin_dashboard_chart.js".into(),
                lineno: line,
                colno: 7,
            })
            .unwrap();
        }
        drop(tx);
        monitor.finished().await;
        collector.settle().await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].category, Category::ERROR);
        assert_eq!(sent[0].metrics.len(), 10);
        assert_eq!(sent[0].metrics[9].get("lineno"), Some(&json!(9)));
    }

    #[tokio::test]
    async fn load_event_records_one_page_sample() {
        let (collector, _transport) = collector();
        let (fire, load) = oneshot::channel();
        let monitor = Monitor::install(&collector, ObservationSources::new().with_load(load));

        fire.send(NavigationTiming {
            navigation_start: 0,
            request_start: 200,
            response_end: 400,
            dom_loading: 100,
            dom_complete: 900,
            load_event_end: 1200,
        })
        .unwrap();
        monitor.finished().await;

        let samples = collector.buffered_samples(&Category::PAGE);
        assert_eq!(samples.len(), 1);
        let page = &samples[0];
        assert_eq!(page.get("pageLoad"), Some(&json!(1200)));
        assert_eq!(page.get("domReady"), Some(&json!(800)));
        assert_eq!(page.get("networkLatency"), Some(&json!(200)));
        assert_eq!(page.get("processingTime"), Some(&json!(500)));
        assert_eq!(page.get("backendTime"), Some(&json!(200)));
    }

    #[tokio::test]
    async fn page_unloaded_before_load_records_nothing() {
        let (collector, _transport) = collector();
        let (fire, load) = oneshot::channel::<NavigationTiming>();
        let monitor = Monitor::install(&collector, ObservationSources::new().with_load(load));
        drop(fire);
        monitor.finished().await;
        assert_eq!(collector.buffered(&Category::PAGE), 0);
    }
}
