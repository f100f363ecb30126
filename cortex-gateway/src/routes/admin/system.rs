//! `/admin/system/*` (spec.md §6): host capability/capacity views the
//! admin UI renders on its dashboard.

use axum::extract::{Extension, State};
use axum::Json;
use chrono::{DateTime, Duration, Timelike, Utc};
use cortex_common::request_id::RequestId;
use cortex_controller::gpu_info::{self, GpuInfo};
use cortex_values::model::ModelState;
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth_middleware::AdminPrincipal;
use crate::error::GatewayError;
use crate::state::SharedState;

fn rid(request_id: &RequestId) -> String {
    request_id.as_str().to_string()
}

#[derive(Debug, Serialize)]
pub struct Capabilities {
    pub offline_mode: bool,
    pub vllm_version: String,
    pub llamacpp_tag: String,
    pub engine_kinds: Vec<&'static str>,
}

pub async fn capabilities(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
) -> Json<Capabilities> {
    Json(Capabilities {
        offline_mode: state.env.offline_mode,
        vllm_version: state.env.vllm_version.clone(),
        llamacpp_tag: state.env.llamacpp_tag.clone(),
        engine_kinds: vec!["transformers-server", "gguf-server"],
    })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Throughput {
    pub running_models: usize,
    pub requests_last_hour: usize,
    pub total_tokens_last_hour: u64,
    pub avg_latency_ms: f64,
}

/// `GET /admin/system/throughput` (spec.md §6): a rollup over the last
/// hour of usage records plus how many models are currently serving.
pub async fn throughput(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<Throughput>, GatewayError> {
    let running = state
        .registry
        .list(&cortex_registry::ModelFilters { state: Some(ModelState::Running), ..Default::default() })
        .map_err(|err| GatewayError::new(err, rid(&request_id)))?
        .len();

    let cutoff = Utc::now() - Duration::hours(1);
    let records = recent_usage(&state, &request_id, cutoff)?;
    let total_tokens: u64 = records.iter().map(|r| r.total_tokens).sum();
    let avg_latency_ms = if records.is_empty() {
        0.0
    } else {
        records.iter().map(|r| r.latency_ms as f64).sum::<f64>() / records.len() as f64
    };

    Ok(Json(Throughput {
        running_models: running,
        requests_last_hour: records.len(),
        total_tokens_last_hour: total_tokens,
        avg_latency_ms,
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HostSummary {
    pub cpu_count: usize,
    pub gpu_count: usize,
    pub offline_mode: bool,
    pub models_dir: String,
}

pub async fn host_summary(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
) -> Json<HostSummary> {
    Json(HostSummary {
        cpu_count: num_cpus::get(),
        gpu_count: gpu_info::discover().len(),
        offline_mode: state.env.offline_mode,
        models_dir: state.env.models_dir.clone(),
    })
}

#[derive(Debug, Serialize)]
pub struct HostTrendPoint {
    pub hour: DateTime<Utc>,
    pub requests: usize,
    pub total_tokens: u64,
}

/// `GET /admin/system/host/trends` (spec.md §6): the same usage rows
/// `throughput` uses, bucketed hourly over the trailing day.
pub async fn host_trends(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<Vec<HostTrendPoint>>, GatewayError> {
    let cutoff = Utc::now() - Duration::hours(24);
    let records = recent_usage(&state, &request_id, cutoff)?;

    let mut buckets: std::collections::BTreeMap<DateTime<Utc>, (usize, u64)> = std::collections::BTreeMap::new();
    for record in &records {
        let hour = record
            .created_at
            .date_naive()
            .and_hms_opt(record.created_at.time().hour(), 0, 0)
            .unwrap()
            .and_utc();
        let entry = buckets.entry(hour).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += record.total_tokens;
    }

    Ok(Json(
        buckets
            .into_iter()
            .map(|(hour, (requests, total_tokens))| HostTrendPoint { hour, requests, total_tokens })
            .collect(),
    ))
}

pub async fn gpus(AdminPrincipal(_principal): AdminPrincipal) -> Json<Vec<GpuInfo>> {
    Json(gpu_info::discover())
}

fn recent_usage(
    state: &SharedState,
    request_id: &RequestId,
    cutoff: DateTime<Utc>,
) -> Result<Vec<cortex_values::model::UsageRecord>, GatewayError> {
    let tree = state
        .store
        .usage()
        .map_err(|err| GatewayError::new(cortex_common::error::CortexError::from(err), rid(request_id)))?;
    let mut rows = cortex_registry::store::scan_rows::<cortex_values::model::UsageRecord>(&tree)
        .map_err(|err| GatewayError::new(cortex_common::error::CortexError::from(err), rid(request_id)))?;
    rows.retain(|r| r.created_at >= cutoff);
    Ok(rows)
}
