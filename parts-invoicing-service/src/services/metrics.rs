//! Prometheus metrics for parts-invoicing-service.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Recorder behind the `metrics` facade used by the shared HTTP middleware.
///
/// Installed once per process; `None` if another recorder got there first.
static RECORDER: Lazy<Option<PrometheusHandle>> = Lazy::new(|| {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| tracing::warn!(error = %e, "Failed to install Prometheus recorder"))
        .ok()
});

/// gRPC request counter by method and status.
pub static GRPC_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "parts_invoicing_grpc_requests_total",
        "Total number of gRPC requests",
        &["method", "status"]
    )
    .expect("Failed to register grpc_requests_total")
});

/// gRPC request duration histogram by method.
pub static GRPC_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "parts_invoicing_grpc_request_duration_seconds",
        "gRPC request duration in seconds",
        &["method"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register grpc_request_duration")
});

/// Invoice save counter by outcome.
pub static INVOICES_SAVED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "parts_invoicing_invoices_saved_total",
        "Total number of invoice saves by outcome",
        &["outcome"] // created, updated, rejected, conflict, failed
    )
    .expect("Failed to register invoices_saved_total")
});

/// Units of stock moved by invoice saves.
pub static STOCK_UNITS_MOVED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "parts_invoicing_stock_units_moved_total",
        "Units of stock sold or returned by invoice saves",
        &["direction"] // sold, returned
    )
    .expect("Failed to register stock_units_moved_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "parts_invoicing_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "parts_invoicing_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&RECORDER);
    Lazy::force(&GRPC_REQUESTS_TOTAL);
    Lazy::force(&GRPC_REQUEST_DURATION);
    Lazy::force(&INVOICES_SAVED_TOTAL);
    Lazy::force(&STOCK_UNITS_MOVED_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format: the HTTP middleware series
/// followed by the service registry.
pub fn get_metrics() -> String {
    let mut output = RECORDER
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    if let Ok(service_metrics) = encoder.encode_to_string(&metric_families) {
        output.push_str(&service_metrics);
    }
    output
}
