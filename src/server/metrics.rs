use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all sweeparr metrics
const PREFIX: &str = "sweeparr";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Automation cycle metrics
    pub static ref AUTOMATION_CYCLES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_automation_cycles_total"), "Automation cycles by origin and outcome"),
        &["origin", "status"]
    ).expect("Failed to create automation_cycles_total metric");

    pub static ref AUTOMATION_CYCLE_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_automation_cycle_duration_seconds"),
            "Automation cycle duration in seconds"
        )
        .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0])
    ).expect("Failed to create automation_cycle_duration_seconds metric");

    pub static ref AUTOMATION_CYCLE_ACTIVE: Gauge = Gauge::new(
        format!("{PREFIX}_automation_cycle_active"),
        "Whether an automation cycle is currently running (0 or 1)"
    ).expect("Failed to create automation_cycle_active metric");

    pub static ref SEARCHES_TRIGGERED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_searches_triggered_total"), "Searches successfully triggered"),
        &["category", "item_kind"]
    ).expect("Failed to create searches_triggered_total metric");

    pub static ref SEARCH_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_search_failures_total"), "Search trigger calls that failed"),
        &["category"]
    ).expect("Failed to create search_failures_total metric");

    pub static ref DETECTION_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_detection_failures_total"), "Failed per-server detections"),
        &["server_type"]
    ).expect("Failed to create detection_failures_total metric");

    // Activity log metrics
    pub static ref LOG_ENTRIES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_log_entries_total"), "Activity log entries appended"),
        &["type"]
    ).expect("Failed to create log_entries_total metric");

    pub static ref LOG_ENTRIES_PRUNED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_log_entries_pruned_total"),
        "Activity log entries removed by retention"
    ).expect("Failed to create log_entries_pruned_total metric");

    pub static ref LOG_OBSERVERS: Gauge = Gauge::new(
        format!("{PREFIX}_log_observers"),
        "Number of live activity log observers"
    ).expect("Failed to create log_observers metric");

    pub static ref LOG_BROADCAST_DROPPED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_log_broadcast_dropped_total"),
        "Log messages dropped because an observer queue was full"
    ).expect("Failed to create log_broadcast_dropped_total metric");

    // Error Metrics
    pub static ref ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_errors_total"), "Total errors by type and endpoint"),
        &["error_type", "endpoint"]
    ).expect("Failed to create errors_total metric");

    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(AUTOMATION_CYCLES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(AUTOMATION_CYCLE_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(AUTOMATION_CYCLE_ACTIVE.clone()));
    let _ = REGISTRY.register(Box::new(SEARCHES_TRIGGERED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SEARCH_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(DETECTION_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(LOG_ENTRIES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(LOG_ENTRIES_PRUNED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(LOG_OBSERVERS.clone()));
    let _ = REGISTRY.register(Box::new(LOG_BROADCAST_DROPPED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ERRORS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record a finished automation cycle
pub fn record_cycle(is_manual: bool, success: bool, duration: Duration) {
    let origin = if is_manual { "manual" } else { "scheduled" };
    let status = if success { "success" } else { "failed" };
    AUTOMATION_CYCLES_TOTAL
        .with_label_values(&[origin, status])
        .inc();
    AUTOMATION_CYCLE_DURATION_SECONDS.observe(duration.as_secs_f64());
}

pub fn set_cycle_active(active: bool) {
    AUTOMATION_CYCLE_ACTIVE.set(if active { 1.0 } else { 0.0 });
}

pub fn record_searches_triggered(category: &str, item_kind: &str, count: u32) {
    if count > 0 {
        SEARCHES_TRIGGERED_TOTAL
            .with_label_values(&[category, item_kind])
            .inc_by(count as f64);
    }
}

pub fn record_search_failure(category: &str) {
    SEARCH_FAILURES_TOTAL.with_label_values(&[category]).inc();
}

pub fn record_detection_failure(server_type: &str) {
    DETECTION_FAILURES_TOTAL
        .with_label_values(&[server_type])
        .inc();
}

pub fn record_log_entry(entry_type: &str) {
    LOG_ENTRIES_TOTAL.with_label_values(&[entry_type]).inc();
}

pub fn record_log_entries_pruned(count: usize) {
    LOG_ENTRIES_PRUNED_TOTAL.inc_by(count as f64);
}

pub fn set_log_observers(count: usize) {
    LOG_OBSERVERS.set(count as f64);
}

pub fn record_broadcast_drop() {
    LOG_BROADCAST_DROPPED_TOTAL.inc();
}

/// Record an error
pub fn record_error(error_type: &str, endpoint: &str) {
    ERRORS_TOTAL
        .with_label_values(&[error_type, endpoint])
        .inc();
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    // RSS is reported in kB
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<f64>() {
                            PROCESS_MEMORY_BYTES.set(kb * 1024.0);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_metric(name: &str) -> bool {
        REGISTRY
            .gather()
            .iter()
            .any(|m| m.get_name() == format!("{PREFIX}_{name}"))
    }

    #[test]
    fn test_metrics_initialization() {
        init_metrics();

        let metric_families = REGISTRY.gather();
        assert!(!metric_families.is_empty(), "Metrics should be registered");
    }

    #[test]
    fn test_record_http_request() {
        init_metrics();

        record_http_request("GET", "/v1/automation/status", 200, Duration::from_millis(50));

        assert!(has_metric("http_requests_total"));
    }

    #[test]
    fn test_record_cycle() {
        init_metrics();

        record_cycle(true, false, Duration::from_secs(3));
        record_searches_triggered("missing", "movie", 4);

        assert!(has_metric("automation_cycles_total"));
        assert!(has_metric("searches_triggered_total"));
        let failed = AUTOMATION_CYCLES_TOTAL
            .with_label_values(&["manual", "failed"])
            .get();
        assert!(failed >= 1.0);
    }

    #[tokio::test]
    async fn test_metrics_handler_renders_text() {
        init_metrics();
        record_log_entry("cycle_start");

        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
