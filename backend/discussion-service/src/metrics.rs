//! Prometheus metrics for discussion-service.

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

/// Votes applied, by subject kind and transition (e.g. `post`, `none_to_up`)
pub static VOTES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "discussion_votes_total",
        "Votes applied by subject and state transition",
        &["subject", "transition"]
    )
    .expect("discussion_votes_total metric can be registered")
});

/// Comment writes by operation (`add`, `update`, `delete`)
pub static COMMENT_WRITES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "discussion_comment_writes_total",
        "Comment writes by operation",
        &["operation"]
    )
    .expect("discussion_comment_writes_total metric can be registered")
});

/// Failed protocol operations by error code
pub static OPERATION_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "discussion_operation_errors_total",
        "Failed operations by operation and error code",
        &["operation", "code"]
    )
    .expect("discussion_operation_errors_total metric can be registered")
});

/// Live query subscriptions opened, by collection kind
pub static SUBSCRIPTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "discussion_subscriptions_total",
        "Live query subscriptions opened",
        &["kind"]
    )
    .expect("discussion_subscriptions_total metric can be registered")
});

pub static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "discussion_http_request_duration_seconds",
        "HTTP request latency",
        &["method", "status"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("discussion_http_request_duration_seconds metric can be registered")
});

pub fn record_error(operation: &str, code: &str) {
    OPERATION_ERRORS_TOTAL
        .with_label_values(&[operation, code])
        .inc();
}

/// Actix handler that renders Prometheus metrics in text format.
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
