use serde::{Deserialize, Serialize};

/// Absolute navigation timestamps (ms), as exposed by `performance.timing`
/// once the load event has fired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationTiming {
    pub navigation_start: i64,
    pub request_start: i64,
    pub response_end: i64,
    pub dom_loading: i64,
    pub dom_complete: i64,
    pub load_event_end: i64,
}

/// The `page` sample recorded once per page load.
///
/// Phases are plain differences; a phase that has not completed yet (its
/// end timestamp still 0) comes out negative, as the browser would report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTimings {
    pub page_load: i64,
    pub dom_ready: i64,
    pub network_latency: i64,
    pub processing_time: i64,
    pub backend_time: i64,
}

impl From<&NavigationTiming> for PageTimings {
    fn from(t: &NavigationTiming) -> Self {
        Self {
            page_load: t.load_event_end - t.navigation_start,
            dom_ready: t.dom_complete - t.dom_loading,
            network_latency: t.response_end - t.request_start,
            processing_time: t.dom_complete - t.response_end,
            backend_time: t.response_end - t.request_start,
        }
    }
}
