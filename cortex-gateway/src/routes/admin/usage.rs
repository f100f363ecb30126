//! `/admin/usage/*` (spec.md §6): raw listing, time-bucketed series,
//! aggregate totals, latency/ttft percentiles, and CSV export over the
//! durable usage log.

use axum::extract::{Extension, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Duration, Timelike, Utc};
use cortex_common::request_id::RequestId;
use cortex_values::model::{TaskKind, UsageRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::auth_middleware::AdminPrincipal;
use crate::error::GatewayError;
use crate::state::SharedState;

fn rid(request_id: &RequestId) -> String {
    request_id.as_str().to_string()
}

#[derive(Debug, Deserialize, Default)]
pub struct UsageQuery {
    pub key_id: Option<i64>,
    pub served_name: Option<String>,
    pub since_hours: Option<i64>,
}

fn load_filtered(state: &SharedState, request_id: &RequestId, query: &UsageQuery) -> Result<Vec<UsageRecord>, GatewayError> {
    let tree = state
        .store
        .usage()
        .map_err(|err| GatewayError::new(cortex_common::error::CortexError::from(err), rid(request_id)))?;
    let mut rows = cortex_registry::store::scan_rows::<UsageRecord>(&tree)
        .map_err(|err| GatewayError::new(cortex_common::error::CortexError::from(err), rid(request_id)))?;

    if let Some(key_id) = query.key_id {
        rows.retain(|r| r.key_id == key_id);
    }
    if let Some(served_name) = &query.served_name {
        rows.retain(|r| &r.served_name == served_name);
    }
    if let Some(hours) = query.since_hours {
        let cutoff = Utc::now() - Duration::hours(hours);
        rows.retain(|r| r.created_at >= cutoff);
    }
    rows.sort_by_key(|r| r.created_at);
    Ok(rows)
}

pub async fn list_usage(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<Vec<UsageRecord>>, GatewayError> {
    Ok(Json(load_filtered(&state, &request_id, &query)?))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SeriesPoint {
    pub hour: DateTime<Utc>,
    pub requests: usize,
    pub total_tokens: u64,
}

pub async fn usage_series(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<Vec<SeriesPoint>>, GatewayError> {
    let rows = load_filtered(&state, &request_id, &query)?;
    let mut buckets: BTreeMap<DateTime<Utc>, (usize, u64)> = BTreeMap::new();
    for row in &rows {
        let hour = row.created_at - Duration::minutes(row.created_at.minute() as i64) - Duration::seconds(row.created_at.second() as i64);
        let entry = buckets.entry(hour).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += row.total_tokens;
    }
    Ok(Json(
        buckets.into_iter().map(|(hour, (requests, total_tokens))| SeriesPoint { hour, requests, total_tokens }).collect(),
    ))
}

#[derive(Debug, Serialize)]
pub struct AggregateRow {
    pub served_name: String,
    pub task_kind: TaskKind,
    pub requests: usize,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

pub async fn usage_aggregate(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<Vec<AggregateRow>>, GatewayError> {
    let rows = load_filtered(&state, &request_id, &query)?;
    let mut buckets: BTreeMap<(String, TaskKind), AggregateRow> = BTreeMap::new();
    for row in rows {
        let key = (row.served_name.clone(), row.task_kind);
        let entry = buckets.entry(key).or_insert_with(|| AggregateRow {
            served_name: row.served_name.clone(),
            task_kind: row.task_kind,
            requests: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
        });
        entry.requests += 1;
        entry.prompt_tokens += row.prompt_tokens;
        entry.completion_tokens += row.completion_tokens;
        entry.total_tokens += row.total_tokens;
    }
    Ok(Json(buckets.into_values().collect()))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LatencyStats {
    pub count: usize,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((p * (sorted.len() - 1) as f64).round() as usize).min(sorted.len() - 1);
    sorted[rank]
}

pub async fn usage_latency(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<LatencyStats>, GatewayError> {
    let rows = load_filtered(&state, &request_id, &query)?;
    let mut latencies: Vec<u64> = rows.iter().map(|r| r.latency_ms).collect();
    latencies.sort_unstable();
    Ok(Json(LatencyStats {
        count: latencies.len(),
        p50_ms: percentile(&latencies, 0.50),
        p95_ms: percentile(&latencies, 0.95),
        p99_ms: percentile(&latencies, 0.99),
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TtftStats {
    pub samples: usize,
    pub p50_seconds: f64,
    pub p95_seconds: f64,
}

/// `GET /admin/usage/ttft` (spec.md §6): time-to-first-byte percentiles.
/// Per-request TTFT isn't part of the durable usage row (spec.md §4.7's
/// schema is token/latency/status only); this reads it back out of the
/// gateway's own `gateway_stream_ttft_seconds` histogram instead.
pub async fn usage_ttft(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
) -> Json<TtftStats> {
    let rendered = state.metrics_handle.render();
    let samples = cortex_metrics::parse_exposition(&rendered).unwrap_or_default();
    let mut values: Vec<f64> = samples
        .iter()
        .filter(|s| s.name == "gateway_stream_ttft_seconds" || s.name.starts_with("gateway_stream_ttft_seconds_"))
        .map(|s| s.value)
        .collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let pct = |p: f64| -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let rank = ((p * (values.len() - 1) as f64).round() as usize).min(values.len() - 1);
        values[rank]
    };

    Json(TtftStats { samples: values.len(), p50_seconds: pct(0.50), p95_seconds: pct(0.95) })
}

/// `GET /admin/usage/export` (spec.md §6): CSV export of the filtered log.
pub async fn usage_export(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<UsageQuery>,
) -> Result<Response, GatewayError> {
    let rows = load_filtered(&state, &request_id, &query)?;
    let mut csv = String::from("id,key_id,served_name,task_kind,prompt_tokens,completion_tokens,total_tokens,latency_ms,http_status,request_id,created_at\n");
    for row in rows {
        csv.push_str(&format!(
            "{},{},{},{:?},{},{},{},{},{},{},{}\n",
            row.id,
            row.key_id,
            row.served_name,
            row.task_kind,
            row.prompt_tokens,
            row.completion_tokens,
            row.total_tokens,
            row.latency_ms,
            row.http_status,
            row.request_id,
            row.created_at.to_rfc3339(),
        ));
    }
    let mut response = csv.into_response();
    response.headers_mut().insert(
        axum::http::header::CONTENT_TYPE,
        axum::http::HeaderValue::from_static("text/csv"),
    );
    Ok(response)
}
