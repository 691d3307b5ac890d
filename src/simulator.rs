use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rand::SeedableRng;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use crate::metrics::MetricsCollector;
use crate::observe::{
    ErrorEvent, Monitor, NavigationTiming, ObservationSources, PerformanceEntry, ResourceTiming,
};

// ─── Portal fixtures ─────────────────────────────────────────────

static PAGES: &[&str] = &[
    "/admin/dashboard/",
    "/admin/settings/",
    "/admin/artist-applications/",
    "/portal/",
    "/portal/uploads/",
    "/accounts/signup/",
];

static RESOURCES: &[(&str, &str)] = &[
    ("/static/js/base.js", "script"),
    ("/static/js/common.js", "script"),
    ("/static/js/dashboard.js", "script"),
    ("/static/js/admin_dashboard_chart.js", "script"),
    ("/static/js/monitoring.js", "script"),
    ("/static/dist/css/output.css", "link"),
    ("/static/img/logo.svg", "img"),
    ("/api/dashboard/stats/", "fetch"),
    ("/api/settings/", "xmlhttprequest"),
];

static ERRORS: &[(&str, &str)] = &[
    ("TypeError: Cannot read properties of null (reading 'value')", "/static/js/auth.js"),
    ("ReferenceError: Chart is not defined", "/static/js/admin_dashboard_chart.js"),
    ("TypeError: Failed to fetch", "/static/js/common.js"),
    ("SyntaxError: Unexpected token '<'", "/static/js/dashboard.js"),
];

// ─── Public entry point ──────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Number of page loads to play back to back.
    pub page_views: u32,
    /// Probability (0–1) of each page throwing an uncaught error.
    pub error_rate: f64,
    /// Base seed; view `n` uses `seed + n`.
    pub seed: u64,
    /// Pause between page views.
    pub think_time: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            page_views: 20,
            error_rate: 0.3,
            seed: 1000,
            think_time: Duration::ZERO,
        }
    }
}

/// What the host emitted over the whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    pub page_views: u32,
    pub performance_entries: u64,
    pub resources: u64,
    pub errors: u64,
}

/// Plays `config.page_views` synthetic page loads through the observation
/// adapters into `collector`.
pub async fn run(collector: &MetricsCollector, config: &SimulationConfig) -> SimulationReport {
    let mut report = SimulationReport::default();

    for view in 0..config.page_views {
        let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(view as u64));
        page_view(collector, &mut rng, config.error_rate, &mut report).await;
        report.page_views += 1;

        if !config.think_time.is_zero() {
            tokio::time::sleep(config.think_time).await;
        }
    }

    report
}

// ─── One page load ───────────────────────────────────────────────

async fn page_view(
    collector: &MetricsCollector,
    rng: &mut StdRng,
    error_rate: f64,
    report: &mut SimulationReport,
) {
    let page = PAGES.choose(rng).copied().unwrap_or("/");

    let (perf_tx, perf_rx) = mpsc::unbounded_channel();
    let (error_tx, error_rx) = mpsc::unbounded_channel();
    let (load_tx, load_rx) = oneshot::channel();
    let resources = resource_snapshot(rng);
    report.resources += resources.len() as u64;

    let monitor = Monitor::install(
        collector,
        ObservationSources::new()
            .with_performance(UnboundedReceiverStream::new(perf_rx))
            .with_resources(resources)
            .with_errors(UnboundedReceiverStream::new(error_rx))
            .with_load(load_rx),
    );

    // ── Paint, LCP, first input ─────────────────────────────────
    let fp = rng.gen_range(150.0..900.0);
    let fcp = fp + rng.gen_range(0.0..150.0);
    let lcp = fcp + rng.gen_range(50.0..1_500.0);
    let entries = [
        entry("first-paint", "paint", fp, 0.0),
        entry("first-contentful-paint", "paint", fcp, 0.0),
        entry(page, "largest-contentful-paint", lcp, 0.0),
        entry(
            "pointerdown",
            "first-input",
            lcp + rng.gen_range(100.0..3_000.0),
            rng.gen_range(1.0..80.0),
        ),
    ];
    for e in entries {
        report.performance_entries += 1;
        let _ = perf_tx.send(e);
    }

    // ── Uncaught errors ─────────────────────────────────────────
    let error_rate = if error_rate.is_finite() {
        error_rate.clamp(0.0, 0.95)
    } else {
        0.0
    };
    while rng.gen_bool(error_rate) {
        let (message, filename) = ERRORS.choose(rng).copied().unwrap_or(ERRORS[0]);
        report.errors += 1;
        let _ = error_tx.send(ErrorEvent {
            message: message.into(),
            filename: filename.into(),
            lineno: rng.gen_range(1..400),
            colno: rng.gen_range(1..80),
        });
    }

    // ── Load event ──────────────────────────────────────────────
    let _ = load_tx.send(navigation_timing(rng));

    // Unload: the host closes its feeds.
    drop(perf_tx);
    drop(error_tx);
    monitor.finished().await;

    debug!(page, "page view complete");
}

fn entry(name: &str, entry_type: &str, start_time: f64, duration: f64) -> PerformanceEntry {
    PerformanceEntry {
        name: name.into(),
        duration,
        start_time,
        entry_type: entry_type.into(),
    }
}

fn resource_snapshot(rng: &mut StdRng) -> Vec<ResourceTiming> {
    let count = rng.gen_range(3..=RESOURCES.len());
    RESOURCES
        .choose_multiple(rng, count)
        .map(|(name, initiator)| ResourceTiming {
            name: (*name).into(),
            duration: rng.gen_range(2.0..400.0),
            transfer_size: rng.gen_range(0..250_000),
            initiator_type: (*initiator).into(),
        })
        .collect()
}

/// Monotone navigation timestamps anchored at a fixed epoch millisecond.
fn navigation_timing(rng: &mut StdRng) -> NavigationTiming {
    let navigation_start = 1_700_000_000_000 + rng.gen_range(0..86_400_000);
    let request_start = navigation_start + rng.gen_range(5..120);
    let response_end = request_start + rng.gen_range(20..900);
    let dom_loading = response_end + rng.gen_range(1..30);
    let dom_complete = dom_loading + rng.gen_range(100..1_800);
    let load_event_end = dom_complete + rng.gen_range(1..200);

    NavigationTiming {
        navigation_start,
        request_start,
        response_end,
        dom_loading,
        dom_complete,
        load_event_end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CollectorConfig, RetryPolicy};
    use crate::metrics::Category;
    use crate::transport::mock::MockTransport;
    use std::sync::Arc;

    fn collector() -> (MetricsCollector, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let config = CollectorConfig {
            retry: RetryPolicy::disabled(),
            ..CollectorConfig::default()
        };
        (MetricsCollector::new(config, transport.clone()), transport)
    }

    #[tokio::test]
    async fn every_emitted_sample_is_sent_or_buffered() {
        let (collector, _transport) = collector();
        let report = run(
            &collector,
            &SimulationConfig {
                page_views: 12,
                error_rate: 0.5,
                ..SimulationConfig::default()
            },
        )
        .await;
        collector.settle().await;

        let stats = collector.stats();
        let accounted = |cat: &Category| {
            let s = stats.category(cat);
            s.buffered as u64 + s.samples_sent
        };
        assert_eq!(accounted(&Category::PERFORMANCE), report.performance_entries);
        assert_eq!(accounted(&Category::NETWORK), report.resources);
        assert_eq!(accounted(&Category::ERROR), report.errors);
        assert_eq!(accounted(&Category::PAGE), 12);
    }

    #[tokio::test]
    async fn same_seed_same_session() {
        let config = SimulationConfig {
            page_views: 5,
            ..SimulationConfig::default()
        };
        let (a, _) = collector();
        let (b, _) = collector();
        assert_eq!(run(&a, &config).await, run(&b, &config).await);
    }

    #[tokio::test]
    async fn non_finite_error_rate_throws_nothing() {
        for error_rate in [f64::NAN, f64::INFINITY] {
            let (collector, _transport) = collector();
            let report = run(
                &collector,
                &SimulationConfig {
                    page_views: 3,
                    error_rate,
                    ..SimulationConfig::default()
                },
            )
            .await;
            assert_eq!(report.page_views, 3);
            assert_eq!(report.errors, 0);
        }
    }

    #[test]
    fn navigation_timing_is_monotone() {
        let mut rng = StdRng::seed_from_u64(7);
        let t = navigation_timing(&mut rng);
        assert!(t.navigation_start < t.request_start);
        assert!(t.request_start < t.response_end);
        assert!(t.response_end < t.dom_loading);
        assert!(t.dom_loading < t.dom_complete);
        assert!(t.dom_complete < t.load_event_end);
    }
}
