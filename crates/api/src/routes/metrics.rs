//! Prometheus metrics endpoint and the shop's metric descriptions.

use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use metrics::Unit;
use metrics_exporter_prometheus::PrometheusHandle;

/// Registers help text for every metric the domain services emit.
pub fn describe() {
    metrics::describe_counter!(
        "orders_created_total",
        "Orders created, labelled by source (checkout or direct)"
    );
    metrics::describe_counter!(
        "checkout_failures_total",
        "Failed checkouts, labelled by error kind"
    );
    metrics::describe_counter!("orders_cancelled_total", "Orders cancelled");
    metrics::describe_counter!("cart_merges_total", "Guest carts merged into user carts");
    metrics::describe_histogram!(
        "checkout_duration_seconds",
        Unit::Seconds,
        "Time spent completing a successful checkout"
    );
}

/// GET /metrics — Prometheus text exposition.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
