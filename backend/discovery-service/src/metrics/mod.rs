//! Discovery Service Metrics
//!
//! Prometheus metrics for ranking queries, interaction ingestion and
//! preference synthesis, plus HTTP request accounting.

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use std::time::Duration;

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "discovery_http_requests_total",
        "Total HTTP requests handled by discovery-service",
        &["method", "path", "status"]
    )
    .expect("Failed to register discovery http requests metric")
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "discovery_http_request_duration_seconds",
        "HTTP request latency for discovery-service",
        &["method", "path", "status"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register discovery http duration metric")
});

static QUERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "discovery_queries_total",
        "Ranked discovery queries by sort mode and outcome",
        &["sort_mode", "status"]
    )
    .expect("Failed to register discovery queries metric")
});

static QUERY_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "discovery_query_duration_seconds",
        "Page plus count latency per sort mode",
        &["sort_mode"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register discovery query duration metric")
});

static INTERACTION_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "discovery_interaction_events_total",
        "Interaction events by type and outcome (applied/deduplicated/dropped)",
        &["interaction_type", "status"]
    )
    .expect("Failed to register discovery interaction events metric")
});

static PREFERENCE_SYNTHESIS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "discovery_preference_synthesis_total",
        "Preference embedding synthesis runs by outcome",
        &["status"]
    )
    .expect("Failed to register discovery preference synthesis metric")
});

pub fn observe_http_request(method: &str, path: &str, status: u16, elapsed: Duration) {
    let status_label = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status_label])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path, &status_label])
        .observe(elapsed.as_secs_f64());
}

/// Record one ranked query; `status` is `ok` or an error code
pub fn record_query(sort_mode: &str, status: &str, elapsed: Duration) {
    QUERIES_TOTAL.with_label_values(&[sort_mode, status]).inc();
    QUERY_DURATION_SECONDS
        .with_label_values(&[sort_mode])
        .observe(elapsed.as_secs_f64());
}

pub fn record_interaction_event(interaction_type: &str, status: &str) {
    INTERACTION_EVENTS_TOTAL
        .with_label_values(&[interaction_type, status])
        .inc();
}

pub fn record_preference_synthesis(status: &str) {
    PREFERENCE_SYNTHESIS_TOTAL.with_label_values(&[status]).inc();
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
