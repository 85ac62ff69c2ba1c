//! Request metrics and the service health verdict.
//!
//! Every HTTP request passes through [`track_requests`], which records it in a
//! Prometheus registry owned by the [`HealthTracker`]:
//!
//! | Metric | Kind | Labels |
//! |--------|------|--------|
//! | `http_requests_total` | counter | `method`, `path` |
//! | `http_errors_total` | counter | `method`, `path` (status 400 and above) |
//! | `http_request_duration_seconds` | summary | none |
//!
//! The verdict is read back from the rendered registry: `unhealthy` when the
//! error rate exceeds 5 % or the median latency exceeds one second. The
//! median covers the exporter's rolling summary window.

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use itertools::Itertools;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const REQUESTS_TOTAL: &str = "http_requests_total";
pub const ERRORS_TOTAL: &str = "http_errors_total";
pub const REQUEST_DURATION: &str = "http_request_duration_seconds";

pub const MAX_ERROR_RATE: f64 = 0.05;
pub const MAX_MEDIAN_LATENCY_SECS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Point-in-time view of the request metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub request_count: u64,
    pub error_count: u64,
    pub error_rate: f64,
    pub median_latency_seconds: f64,
}

impl MetricsSnapshot {
    pub fn status(&self) -> HealthStatus {
        if self.error_rate > MAX_ERROR_RATE || self.median_latency_seconds > MAX_MEDIAN_LATENCY_SECS
        {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Prometheus registry for the HTTP surface.
///
/// The recorder is scoped to this tracker rather than installed globally, so
/// every router gets its own counters.
pub struct HealthTracker {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        Self { recorder, handle }
    }

    /// Record one finished request.
    ///
    /// # Arguments
    ///
    /// * `method` - HTTP method
    /// * `path` - Matched route, not the raw URI, to keep label cardinality fixed
    /// * `status` - Response status code
    /// * `latency` - Time spent producing the response
    pub fn record(&self, method: &str, path: &str, status: u16, latency: Duration) {
        metrics::with_local_recorder(&self.recorder, || {
            counter!(REQUESTS_TOTAL, "method" => method.to_string(), "path" => path.to_string())
                .increment(1);
            if status >= 400 {
                counter!(ERRORS_TOTAL, "method" => method.to_string(), "path" => path.to_string())
                    .increment(1);
            }
            histogram!(REQUEST_DURATION).record(latency.as_secs_f64());
        });
    }

    /// Drain pending histogram samples into the summaries.
    pub fn run_upkeep(&self) {
        self.handle.run_upkeep();
    }

    /// Prometheus text exposition with the `#` comment lines removed.
    pub fn render(&self) -> String {
        self.handle.run_upkeep();
        self.handle
            .render()
            .lines()
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .join("\n")
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let exposition = self.render();
        let request_count = sample_sum(&exposition, REQUESTS_TOTAL, None) as u64;
        let error_count = sample_sum(&exposition, ERRORS_TOTAL, None) as u64;
        let error_rate = if request_count == 0 {
            0.0
        } else {
            error_count as f64 / request_count as f64
        };
        MetricsSnapshot {
            request_count,
            error_count,
            error_rate,
            median_latency_seconds: sample_sum(
                &exposition,
                REQUEST_DURATION,
                Some(r#"quantile="0.5""#),
            ),
        }
    }
}

/// Split an exposition into `(series, value)` pairs.
pub fn samples(exposition: &str) -> impl Iterator<Item = (&str, f64)> {
    exposition
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.rsplit_once(' '))
        .filter_map(|(series, value)| Some((series, value.parse::<f64>().ok()?)))
}

/// Sum of every series of `metric`, optionally only those carrying `label`.
fn sample_sum(exposition: &str, metric: &str, label: Option<&str>) -> f64 {
    samples(exposition)
        .filter(|&(series, _)| {
            let (name, labels) = series.split_once('{').unwrap_or((series, ""));
            name == metric && label.is_none_or(|l| labels.contains(l))
        })
        .map(|(_, value)| value)
        .sum()
}

/// Middleware recording every request in the shared [`HealthTracker`].
pub async fn track_requests(
    State(tracker): State<Arc<HealthTracker>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    tracker.record(&method, &path, response.status().as_u16(), started.elapsed());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_with(ok: usize, errors: usize, latency: Duration) -> HealthTracker {
        let tracker = HealthTracker::new();
        for _ in 0..ok {
            tracker.record("GET", "/news", 200, latency);
        }
        for _ in 0..errors {
            tracker.record("GET", "/yahoofinance", 500, latency);
        }
        tracker
    }

    #[test]
    fn test_empty_tracker_is_healthy() {
        let snapshot = HealthTracker::new().snapshot();
        assert_eq!(snapshot.request_count, 0);
        assert_eq!(snapshot.error_rate, 0.0);
        assert_eq!(snapshot.median_latency_seconds, 0.0);
        assert_eq!(snapshot.status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_error_rate_threshold() {
        let at_limit = tracker_with(95, 5, Duration::from_millis(10)).snapshot();
        assert_eq!(at_limit.request_count, 100);
        assert_eq!(at_limit.error_rate, 0.05);
        assert_eq!(at_limit.status(), HealthStatus::Healthy);

        let above = tracker_with(94, 6, Duration::from_millis(10)).snapshot();
        assert_eq!(above.error_count, 6);
        assert_eq!(above.status(), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_client_errors_count() {
        let tracker = HealthTracker::new();
        tracker.record("GET", "/yahoofinance", 400, Duration::ZERO);
        tracker.record("GET", "unmatched", 404, Duration::ZERO);
        tracker.record("GET", "/news", 399, Duration::ZERO);
        assert_eq!(tracker.snapshot().error_count, 2);
    }

    #[test]
    fn test_slow_median_is_unhealthy() {
        let snapshot = tracker_with(3, 0, Duration::from_millis(1500)).snapshot();
        assert!((snapshot.median_latency_seconds - 1.5).abs() < 0.01);
        assert_eq!(snapshot.status(), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_fast_median_is_healthy() {
        let tracker = tracker_with(9, 0, Duration::from_millis(20));
        tracker.record("GET", "/news", 200, Duration::from_secs(3));
        let snapshot = tracker.snapshot();
        assert!(snapshot.median_latency_seconds < 0.1);
        assert_eq!(snapshot.status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_render_strips_comments() {
        let tracker = tracker_with(2, 1, Duration::from_millis(5));
        let text = tracker.render();
        assert!(!text.lines().any(|line| line.starts_with('#')));
        assert!(text.contains(REQUESTS_TOTAL));
        assert!(text.contains(r#"path="/news""#));
        assert!(text.contains(&format!("{REQUEST_DURATION}_count 3")));
    }

    #[test]
    fn test_trackers_do_not_share_counters() {
        let busy = tracker_with(5, 0, Duration::ZERO);
        let idle = HealthTracker::new();
        assert_eq!(busy.snapshot().request_count, 5);
        assert_eq!(idle.snapshot().request_count, 0);
    }

    #[test]
    fn test_sample_sum_adds_label_sets() {
        let exposition = "\
http_requests_total{method=\"GET\",path=\"/news\"} 3
http_requests_total{method=\"GET\",path=\"/health\"} 4
http_errors_total{method=\"GET\",path=\"/news\"} 1
http_request_duration_seconds{quantile=\"0.5\"} 0.25
http_request_duration_seconds{quantile=\"0.9\"} 2";
        assert_eq!(sample_sum(exposition, REQUESTS_TOTAL, None), 7.0);
        assert_eq!(sample_sum(exposition, ERRORS_TOTAL, None), 1.0);
        assert_eq!(
            sample_sum(exposition, REQUEST_DURATION, Some(r#"quantile="0.5""#)),
            0.25
        );
    }
}
