//! Metrics collection and exposition.
//!
//! # Metrics
//! - `echo_requests_total` (counter): requests by protocol and method
//! - `echo_subscribers` (gauge): active streaming subscriptions
//! - `echo_stream_messages_total` (counter): pongs pushed to subscribers

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Count one answered request.
pub fn record_request(protocol: &'static str, method: &str) {
    metrics::counter!(
        "echo_requests_total",
        "protocol" => protocol,
        "method" => method.to_string()
    )
    .increment(1);
}

/// Publish the current subscriber count.
pub fn record_subscribers(count: i64) {
    metrics::gauge!("echo_subscribers").set(count as f64);
}

/// Count one pong pushed down a subscription.
pub fn record_stream_message() {
    metrics::counter!("echo_stream_messages_total").increment(1);
}
