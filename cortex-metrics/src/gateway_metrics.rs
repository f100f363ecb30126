//! The gateway's own series (spec.md §4.8). Thin named wrappers over the
//! `metrics` facade so call sites read like the behavior they record
//! instead of repeating label names.

pub fn record_request(route: &str, status: u16) {
    metrics::counter!("gateway_requests_total", "route" => route.to_string(), "status" => status.to_string())
        .increment(1);
}

pub fn record_request_latency(route: &str, seconds: f64) {
    metrics::histogram!("gateway_request_latency_seconds", "route" => route.to_string()).record(seconds);
}

pub fn record_upstream_latency(path: &str, seconds: f64) {
    metrics::histogram!("gateway_upstream_latency_seconds", "path" => path.to_string()).record(seconds);
}

pub fn record_upstream_latency_by_upstream(path: &str, base_url: &str, seconds: f64) {
    metrics::histogram!(
        "gateway_upstream_latency_by_upstream_seconds",
        "path" => path.to_string(),
        "base_url" => base_url.to_string()
    )
    .record(seconds);
}

pub fn record_stream_ttft(path: &str, seconds: f64) {
    metrics::histogram!("gateway_stream_ttft_seconds", "path" => path.to_string()).record(seconds);
}

pub fn record_upstream_selected(path: &str, base_url: &str) {
    metrics::counter!(
        "gateway_upstream_selected_total",
        "path" => path.to_string(),
        "base_url" => base_url.to_string()
    )
    .increment(1);
}

pub fn record_key_auth_allowed(reason: &str) {
    metrics::counter!("gateway_key_auth_allowed_total", "reason" => reason.to_string()).increment(1);
}

pub fn record_key_auth_blocked(reason: &str) {
    metrics::counter!("gateway_key_auth_blocked_total", "reason" => reason.to_string()).increment(1);
}

/// `1.0` healthy, `0.0` unhealthy — mirrors `ProbeStatus` from
/// `cortex-health` without creating a dependency edge in that direction.
pub fn record_upstream_health(base_url: &str, healthy: bool) {
    metrics::gauge!("gateway_upstream_health", "base_url" => base_url.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}
