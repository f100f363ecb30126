//! Per-model engine metrics aggregation (spec.md §4.8): scrapes each running
//! backend's own `/metrics` endpoint in-process and normalizes the exposition
//! text into JSON. A failed scrape is embedded inline on its own target; it
//! never fails the aggregate response.

use std::time::Duration;

use serde::Serialize;

/// One backend to scrape, identified the way the registry identifies it.
#[derive(Debug, Clone)]
pub struct ScrapeTarget {
    pub model_id: i64,
    pub model_name: String,
    pub metrics_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineMetricsSnapshot {
    pub model_id: i64,
    pub model_name: String,
    pub metrics_url: String,
    pub ok: bool,
    pub error: Option<String>,
    /// Flattened `name{labels} -> value` view; enough for the admin UI to
    /// chart without needing to understand Prometheus exposition format.
    pub samples: Vec<MetricSample>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricSample {
    pub name: String,
    pub labels: std::collections::BTreeMap<String, String>,
    pub value: f64,
}

const SCRAPE_TIMEOUT: Duration = Duration::from_secs(3);

/// Scrapes every target concurrently. Each target's failure is caught and
/// recorded on its own snapshot rather than propagated.
pub async fn scrape_all(client: &reqwest::Client, targets: Vec<ScrapeTarget>) -> Vec<EngineMetricsSnapshot> {
    let futures = targets.into_iter().map(|target| scrape_one(client, target));
    futures::future::join_all(futures).await
}

async fn scrape_one(client: &reqwest::Client, target: ScrapeTarget) -> EngineMetricsSnapshot {
    match scrape_one_inner(client, &target).await {
        Ok(samples) => EngineMetricsSnapshot {
            model_id: target.model_id,
            model_name: target.model_name,
            metrics_url: target.metrics_url,
            ok: true,
            error: None,
            samples,
        },
        Err(err) => {
            tracing::warn!(model_id = target.model_id, error = %err, "engine metrics scrape failed");
            EngineMetricsSnapshot {
                model_id: target.model_id,
                model_name: target.model_name,
                metrics_url: target.metrics_url,
                ok: false,
                error: Some(err),
                samples: Vec::new(),
            }
        }
    }
}

async fn scrape_one_inner(client: &reqwest::Client, target: &ScrapeTarget) -> Result<Vec<MetricSample>, String> {
    let response = client
        .get(&target.metrics_url)
        .timeout(SCRAPE_TIMEOUT)
        .send()
        .await
        .map_err(|err| err.to_string())?;

    let body = response.text().await.map_err(|err| err.to_string())?;
    parse_exposition(&body)
}

/// Parses raw Prometheus exposition text into the same flattened sample
/// view `scrape_one` produces, for callers (e.g. the admin usage API) that
/// already hold a rendered metrics body and just need it as data.
pub fn parse_exposition(body: &str) -> Result<Vec<MetricSample>, String> {
    let lines = body.lines().map(|line| Ok(line.to_string()));
    let scrape = prometheus_parse::Scrape::parse(lines).map_err(|err| err.to_string())?;

    Ok(scrape
        .samples
        .into_iter()
        .map(|sample| MetricSample {
            name: sample.metric,
            labels: sample.labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            value: match sample.value {
                prometheus_parse::Value::Counter(v) => v,
                prometheus_parse::Value::Gauge(v) => v,
                prometheus_parse::Value::Untyped(v) => v,
                prometheus_parse::Value::Histogram(ref buckets) => {
                    buckets.iter().map(|b| b.count).fold(0.0, f64::max)
                }
                prometheus_parse::Value::Summary(ref quantiles) => {
                    quantiles.iter().map(|q| q.value).fold(0.0, f64::max)
                }
            },
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_exposition_body() {
        let body = "# HELP foo_total help text\n# TYPE foo_total counter\nfoo_total{model=\"a\"} 42\n";
        let samples = parse_exposition(body).expect("parse succeeds");
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].name, "foo_total");
        assert_eq!(samples[0].value, 42.0);
        assert_eq!(samples[0].labels.get("model").map(String::as_str), Some("a"));
    }

    #[test]
    fn rejects_malformed_exposition_text() {
        let body = "this is not prometheus exposition format {{{";
        assert!(parse_exposition(body).is_err());
    }

    #[tokio::test]
    async fn scrape_all_embeds_errors_inline_without_failing() {
        let client = reqwest::Client::new();
        let targets = vec![ScrapeTarget {
            model_id: 1,
            model_name: "unreachable".to_string(),
            metrics_url: "http://127.0.0.1:1/metrics".to_string(),
        }];
        let snapshots = scrape_all(&client, targets).await;
        assert_eq!(snapshots.len(), 1);
        assert!(!snapshots[0].ok);
        assert!(snapshots[0].error.is_some());
    }
}
