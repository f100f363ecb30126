//! Installs the global `metrics` recorder and exposes the Prometheus text
//! render used by `GET /metrics` (spec.md §4.8, §6).

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the process-wide recorder. Call once at startup; the returned
/// handle renders the current state on every scrape.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("installing the Prometheus metrics recorder")
}
