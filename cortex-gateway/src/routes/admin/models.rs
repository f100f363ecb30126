//! `/admin/models/*` (spec.md §6): the session-authenticated CRUD and
//! lifecycle-control surface over the Model Registry and Container
//! Controller.

use std::path::{Path, PathBuf};

use axum::extract::{Extension, Path as AxPath, Query, State};
use axum::Json;
use cortex_common::request_id::RequestId;
use cortex_inspector::inspect_folder;
use cortex_metrics::{EngineMetricsSnapshot, ScrapeTarget};
use cortex_registry::registry::{ModelFilters, ModelPatch, NewModel};
use cortex_values::model::{Model, ModelState};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth_middleware::AdminPrincipal;
use crate::error::GatewayError;
use crate::state::SharedState;

fn rid(request_id: &RequestId) -> String {
    request_id.as_str().to_string()
}

#[derive(Debug, Deserialize)]
pub struct ListModelsQuery {
    pub engine_kind: Option<cortex_values::EngineKind>,
    pub state: Option<ModelState>,
    pub served_name_contains: Option<String>,
}

pub async fn list_models(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<ListModelsQuery>,
) -> Result<Json<Vec<Model>>, GatewayError> {
    let filters = ModelFilters {
        engine_kind: query.engine_kind,
        state: query.state,
        served_name_contains: query.served_name_contains,
    };
    let models = state.registry.list(&filters).map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(Json(models))
}

pub async fn create_model(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Json(new_model): Json<NewModel>,
) -> Result<Json<Model>, GatewayError> {
    let model = state.registry.create(new_model).map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(Json(model))
}

pub async fn get_model(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    AxPath(id): AxPath<i64>,
) -> Result<Json<Model>, GatewayError> {
    let model = state.registry.get_by_id(id).map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(Json(model))
}

pub async fn update_model(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    AxPath(id): AxPath<i64>,
    Json(patch): Json<ModelPatch>,
) -> Result<Json<Model>, GatewayError> {
    let model = state
        .registry
        .update(id, patch)
        .await
        .map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(Json(model))
}

pub async fn delete_model(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    AxPath(id): AxPath<i64>,
) -> Result<axum::http::StatusCode, GatewayError> {
    state.registry.delete(id).map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn start_model(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    AxPath(id): AxPath<i64>,
) -> Result<axum::http::StatusCode, GatewayError> {
    state.controller.start(id).await.map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(axum::http::StatusCode::ACCEPTED)
}

pub async fn stop_model(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    AxPath(id): AxPath<i64>,
) -> Result<axum::http::StatusCode, GatewayError> {
    state.controller.stop(id).await.map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(axum::http::StatusCode::ACCEPTED)
}

pub async fn apply_model(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    AxPath(id): AxPath<i64>,
) -> Result<axum::http::StatusCode, GatewayError> {
    state.controller.apply(id).await.map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(axum::http::StatusCode::ACCEPTED)
}

pub async fn archive_model(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    AxPath(id): AxPath<i64>,
) -> Result<Json<Model>, GatewayError> {
    let model = state.registry.archive(id).await.map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(Json(model))
}

#[derive(Debug, Serialize)]
pub struct DryRunResponse {
    pub command: Vec<String>,
    pub env: Vec<(String, String)>,
    pub vram_estimate: cortex_values::vram::VramEstimate,
}

pub async fn dry_run_model(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    AxPath(id): AxPath<i64>,
) -> Result<Json<DryRunResponse>, GatewayError> {
    let model = state.registry.get_by_id(id).map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    let result = state.controller.dry_run(&model).map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(Json(DryRunResponse {
        command: result.command,
        env: result.env,
        vram_estimate: result.vram_estimate,
    }))
}

#[derive(Debug, Serialize)]
pub struct TestResponse {
    pub success: bool,
    pub latency_ms: u64,
    pub detail: Option<String>,
}

pub async fn test_model(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    AxPath(id): AxPath<i64>,
) -> Result<Json<TestResponse>, GatewayError> {
    let result = state.controller.test(id).await.map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(Json(TestResponse {
        success: result.success,
        latency_ms: result.latency_ms,
        detail: result.detail,
    }))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub diagnose: bool,
    #[serde(default)]
    pub readiness: bool,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub text: String,
    pub diagnosis: Option<cortex_controller::diagnosis::Diagnosis>,
    pub readiness: Option<cortex_values::model::HealthSnapshot>,
}

pub async fn model_logs(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    AxPath(id): AxPath<i64>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, GatewayError> {
    let result = state
        .controller
        .logs(id, query.diagnose)
        .await
        .map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    let readiness = if query.readiness {
        let model = state.registry.get_by_id(id).map_err(|err| GatewayError::new(err, rid(&request_id)))?;
        model.port.map(|port| state.health.get(&format!("http://127.0.0.1:{port}")))
    } else {
        None
    };
    Ok(Json(LogsResponse { text: result.text, diagnosis: result.diagnosis, readiness }))
}

/// `GET /admin/models/metrics` (spec.md §6): per-model vLLM-style metrics,
/// scraped live from each running backend's own `/metrics`.
pub async fn models_metrics(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<Vec<EngineMetricsSnapshot>>, GatewayError> {
    let running = state
        .registry
        .list(&ModelFilters { state: Some(ModelState::Running), ..Default::default() })
        .map_err(|err| GatewayError::new(err, rid(&request_id)))?;

    let targets = running
        .into_iter()
        .filter_map(|m| {
            m.port.map(|port| ScrapeTarget {
                model_id: m.id,
                model_name: m.served_name,
                metrics_url: format!("http://127.0.0.1:{port}/metrics"),
            })
        })
        .collect();

    Ok(Json(cortex_metrics::engine_scrape::scrape_all(&state.http, targets).await))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LocalFolder {
    pub name: String,
    pub path: String,
}

/// `GET /admin/models/local-folders` (spec.md §6): the immediate
/// subdirectories of the configured models base directory, for the admin
/// UI's "create model from local path" picker.
pub async fn local_folders(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<Vec<LocalFolder>>, GatewayError> {
    let base = models_base_dir(&state, &request_id)?;
    let mut folders = Vec::new();
    if let Ok(entries) = std::fs::read_dir(&base) {
        for entry in entries.flatten() {
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    folders.push(LocalFolder { name: name.to_string(), path: entry.path().display().to_string() });
                }
            }
        }
    }
    Ok(Json(folders))
}

#[derive(Debug, Deserialize)]
pub struct InspectFolderQuery {
    pub base: Option<String>,
    pub folder: String,
}

pub async fn inspect_folder_route(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<InspectFolderQuery>,
) -> Result<Json<cortex_inspector::InspectionReport>, GatewayError> {
    let base = match query.base {
        Some(base) => PathBuf::from(base),
        None => models_base_dir(&state, &request_id)?,
    };
    let target = base.join(&query.folder);
    let report = inspect_folder(&target).map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(Json(report))
}

const KEY_BASE_DIR: &[u8] = b"models_base_dir_override";

fn models_base_dir(state: &SharedState, request_id: &RequestId) -> Result<PathBuf, GatewayError> {
    let tree = state
        .store
        .config_kv()
        .map_err(|err| GatewayError::new(cortex_common::error::CortexError::from(err), rid(request_id)))?;
    let override_dir: Option<String> = cortex_registry::store::get_row(&tree, KEY_BASE_DIR)
        .map_err(|err| GatewayError::new(cortex_common::error::CortexError::from(err), rid(request_id)))?;
    Ok(PathBuf::from(override_dir.unwrap_or_else(|| state.env.models_dir.clone())))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BaseDirResponse {
    pub base_dir: String,
}

pub async fn get_base_dir(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<BaseDirResponse>, GatewayError> {
    let dir = models_base_dir(&state, &request_id)?;
    Ok(Json(BaseDirResponse { base_dir: dir.display().to_string() }))
}

#[derive(Debug, Deserialize)]
pub struct SetBaseDirRequest {
    pub base_dir: String,
}

pub async fn put_base_dir(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<SetBaseDirRequest>,
) -> Result<Json<BaseDirResponse>, GatewayError> {
    if !Path::new(&request.base_dir).is_dir() {
        return Err(GatewayError::new(
            cortex_common::error::CortexError::validation("base_dir", "not a directory"),
            rid(&request_id),
        ));
    }
    let tree = state
        .store
        .config_kv()
        .map_err(|err| GatewayError::new(cortex_common::error::CortexError::from(err), rid(&request_id)))?;
    cortex_registry::store::put_row(&tree, KEY_BASE_DIR, &request.base_dir)
        .map_err(|err| GatewayError::new(cortex_common::error::CortexError::from(err), rid(&request_id)))?;
    Ok(Json(BaseDirResponse { base_dir: request.base_dir }))
}
