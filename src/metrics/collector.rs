use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use super::buffer::MetricBuffer;
use super::{Category, Sample};
use crate::clock::{iso_timestamp, Clock, SystemClock};
use crate::config::CollectorConfig;
use crate::error::Result;
use crate::transport::{HttpTransport, Transport};

// ─── Public types ────────────────────────────────────────────────

/// Buffers samples per category and reports each category to the ingestion
/// endpoint once it holds `threshold` samples.
///
/// Cheap to clone; every clone shares the same buffers. Observation
/// callbacks call `record_metric()`, flushes run on background tasks.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Shared>,
}

/// Result of a single flush attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing pending (empty, or every sample already in flight), no
    /// request made.
    Empty,
    /// The endpoint accepted `samples` samples and they were dropped from
    /// the buffer.
    Sent { samples: usize },
}

/// Counters for one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    /// Samples held right now, in-flight batches included.
    pub buffered: usize,
    /// Batches the endpoint accepted.
    pub batches_sent: u64,
    /// Samples removed from the buffer by accepted batches.
    pub samples_sent: u64,
    /// Delivery attempts that errored or got a non-2xx answer.
    pub failed_attempts: u64,
    /// Backoff waits started by background flushes.
    pub retries_scheduled: u64,
    /// A background flush is in flight or waiting out a backoff.
    pub flushing: bool,
    /// Set while waiting out the backoff before this retry.
    pub pending_retry: Option<u32>,
}

/// Read-only view of the collector, keyed by category name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectorStats {
    pub categories: BTreeMap<String, CategoryStats>,
}

impl CollectorStats {
    pub fn category(&self, category: &Category) -> CategoryStats {
        self.categories
            .get(category.as_str())
            .cloned()
            .unwrap_or_default()
    }

    pub fn total_buffered(&self) -> usize {
        self.categories.values().map(|c| c.buffered).sum()
    }

    pub fn total_sent(&self) -> u64 {
        self.categories.values().map(|c| c.samples_sent).sum()
    }
}

// ─── Internal state ──────────────────────────────────────────────

struct Shared {
    config: CollectorConfig,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    state: Mutex<Inner>,
    /// Number of background flush tasks still running.
    tasks: watch::Sender<usize>,
}

#[derive(Default)]
struct Inner {
    buffer: MetricBuffer,
    /// Categories with a background flush task. Absent means accumulating.
    phases: HashMap<Category, Phase>,
    counters: HashMap<Category, Counters>,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Flushing,
    BackingOff { retry: u32 },
}

#[derive(Debug, Default)]
struct Counters {
    batches_sent: u64,
    samples_sent: u64,
    failed_attempts: u64,
    retries_scheduled: u64,
}

/// Decrements the task count when a background flush ends, however it ends.
struct TaskGuard(Arc<Shared>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.tasks.send_modify(|n| *n = n.saturating_sub(1));
    }
}

// ─── MetricsCollector impl ───────────────────────────────────────

impl MetricsCollector {
    pub fn new(config: CollectorConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_clock(config, transport, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: CollectorConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (tasks, _) = watch::channel(0);
        Self {
            inner: Arc::new(Shared {
                config,
                transport,
                clock,
                state: Mutex::new(Inner::default()),
                tasks,
            }),
        }
    }

    /// Validate `config` and report over HTTP to `config.endpoint`.
    pub fn connect(config: CollectorConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.inner.config
    }

    /// Stamp `data` with the current time and append it to `category`.
    ///
    /// Never fails and never waits on the network. Reaching the threshold
    /// starts a background flush unless one is already running for this
    /// category.
    pub fn record_metric(&self, category: impl Into<Category>, data: Map<String, Value>) {
        let category = category.into();
        let sample = Sample::new(data, iso_timestamp(self.inner.clock.now()));

        let start_flush = {
            let mut inner = self.inner.state.lock();
            let len = inner.buffer.push(&category, sample);
            trace!(category = %category, buffered = len, "sample recorded");

            let idle = !inner.phases.contains_key(&category);
            if idle && inner.buffer.pending(&category) >= self.inner.config.threshold {
                inner.phases.insert(category.clone(), Phase::Flushing);
                true
            } else {
                false
            }
        };

        if start_flush {
            self.spawn_flush(category);
        }
    }

    /// Serialize `data` and record it. Values that are not JSON objects are
    /// wrapped as `{"value": ...}`.
    pub fn record<T: Serialize>(&self, category: impl Into<Category>, data: &T) {
        let category = category.into();
        match serde_json::to_value(data) {
            Ok(Value::Object(map)) => self.record_metric(category, map),
            Ok(other) => {
                let mut map = Map::new();
                map.insert("value".to_owned(), other);
                self.record_metric(category, map);
            }
            Err(err) => {
                warn!(category = %category, error = %err, "dropping unserializable sample");
            }
        }
    }

    /// One delivery attempt for `category`.
    ///
    /// The payload is every buffered sample not already in flight. On
    /// success exactly those samples are removed; anything recorded
    /// meanwhile stays. On failure they are kept in place and become
    /// sendable again.
    pub async fn send_metrics_to_server(
        &self,
        category: impl Into<Category>,
    ) -> Result<FlushOutcome> {
        let category = category.into();
        let snapshot = self.inner.state.lock().buffer.snapshot(&category);
        let Some(batch) = snapshot else {
            return Ok(FlushOutcome::Empty);
        };

        let started = Instant::now();
        let result = self.inner.transport.send(&batch.payload).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut inner = self.inner.state.lock();
        match result {
            Ok(()) => {
                let removed = inner.buffer.acknowledge(&batch);
                let remaining = inner.buffer.len(&category);
                let counters = inner.counters.entry(category.clone()).or_default();
                counters.batches_sent += 1;
                counters.samples_sent += removed as u64;
                drop(inner);

                info!(
                    category = %category,
                    samples = batch.len(),
                    removed,
                    remaining,
                    elapsed_ms,
                    "metrics batch delivered"
                );
                Ok(FlushOutcome::Sent {
                    samples: batch.len(),
                })
            }
            Err(err) => {
                inner.buffer.release(&batch);
                inner.counters.entry(category.clone()).or_default().failed_attempts += 1;
                let buffered = inner.buffer.len(&category);
                drop(inner);

                warn!(
                    category = %category,
                    samples = batch.len(),
                    buffered,
                    elapsed_ms,
                    error = %err,
                    "failed to send metrics"
                );
                Err(err)
            }
        }
    }

    /// Send every non-empty category once, e.g. when the session ends.
    pub async fn flush_all(&self) -> Vec<(Category, Result<FlushOutcome>)> {
        let categories = self.inner.state.lock().buffer.non_empty();
        let mut results = Vec::with_capacity(categories.len());
        for category in categories {
            let outcome = self.send_metrics_to_server(category.clone()).await;
            results.push((category, outcome));
        }
        results
    }

    /// Wait until no background flush or backoff is pending.
    pub async fn settle(&self) {
        let mut rx = self.inner.tasks.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    pub fn buffered(&self, category: &Category) -> usize {
        self.inner.state.lock().buffer.len(category)
    }

    pub fn buffered_samples(&self, category: &Category) -> Vec<Sample> {
        self.inner.state.lock().buffer.samples(category)
    }

    pub fn stats(&self) -> CollectorStats {
        let inner = self.inner.state.lock();
        let mut stats = CollectorStats::default();

        for category in inner.buffer.categories().chain(inner.counters.keys()) {
            if stats.categories.contains_key(category.as_str()) {
                continue;
            }
            let counters = inner.counters.get(category);
            stats.categories.insert(
                category.to_string(),
                CategoryStats {
                    buffered: inner.buffer.len(category),
                    batches_sent: counters.map_or(0, |c| c.batches_sent),
                    samples_sent: counters.map_or(0, |c| c.samples_sent),
                    failed_attempts: counters.map_or(0, |c| c.failed_attempts),
                    retries_scheduled: counters.map_or(0, |c| c.retries_scheduled),
                    flushing: inner.phases.contains_key(category),
                    pending_retry: match inner.phases.get(category) {
                        Some(Phase::BackingOff { retry }) => Some(*retry),
                        _ => None,
                    },
                },
            );
        }
        stats
    }

    // ── Background flushing ─────────────────────────────────────

    fn spawn_flush(&self, category: Category) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            // No runtime to run the request on; keep accumulating.
            warn!(category = %category, "no async runtime, flush skipped");
            self.inner.state.lock().phases.remove(&category);
            return;
        };

        self.inner.tasks.send_modify(|n| *n += 1);
        let guard = TaskGuard(self.inner.clone());
        let collector = self.clone();
        handle.spawn(async move {
            let _guard = guard;
            collector.flush_cycle(category).await;
        });
    }

    /// Flush, retrying under the backoff policy, until the category drops
    /// below the threshold or the attempt budget runs out.
    async fn flush_cycle(&self, category: Category) {
        let threshold = self.inner.config.threshold;
        let mut retry = 0u32;

        loop {
            match self.send_metrics_to_server(category.clone()).await {
                Ok(_) => {
                    retry = 0;
                    let drained = {
                        let mut inner = self.inner.state.lock();
                        let drained = inner.buffer.pending(&category) < threshold;
                        if drained {
                            inner.phases.remove(&category);
                        }
                        drained
                    };
                    if drained {
                        return;
                    }
                    debug!(category = %category, "buffer refilled during flush, sending again");
                }
                Err(_) => {
                    retry += 1;
                    let Some(delay) = self.inner.config.retry.backoff(retry) else {
                        let buffered = {
                            let mut inner = self.inner.state.lock();
                            inner.phases.remove(&category);
                            inner.buffer.len(&category)
                        };
                        warn!(
                            category = %category,
                            attempts = retry,
                            buffered,
                            "giving up on flush, samples stay buffered"
                        );
                        return;
                    };

                    {
                        let mut inner = self.inner.state.lock();
                        inner.phases.insert(category.clone(), Phase::BackingOff { retry });
                        inner.counters.entry(category.clone()).or_default().retries_scheduled += 1;
                    }
                    debug!(
                        category = %category,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        "retrying flush after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    self.inner
                        .state
                        .lock()
                        .phases
                        .insert(category.clone(), Phase::Flushing);
                }
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────
