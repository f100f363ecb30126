//! Metrics Collector (C8): the gateway's own Prometheus series (spec.md
//! §4.8) plus a dedicated endpoint that scrapes each running backend's own
//! `/metrics` and normalizes it into JSON — grounded on the pack's gateway
//! idiom (`other_examples/manifests/binn-yang-llm-gateway`, which pairs
//! `metrics`/`metrics-exporter-prometheus` with `prometheus-parse` for
//! exactly this re-scrape-and-normalize shape).

pub mod engine_scrape;
pub mod gateway_metrics;
pub mod recorder;

pub use engine_scrape::{parse_exposition, EngineMetricsSnapshot, MetricSample, ScrapeTarget};
pub use recorder::install_recorder;
