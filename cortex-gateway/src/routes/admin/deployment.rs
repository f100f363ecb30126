//! `/admin/deployment/*` (spec.md §4.10, §6): the admin-facing surface
//! over the Deployment Job Runner. Export/import/restore jobs operate
//! directly on the embedded store's trees; spec.md §1 excludes the
//! offline-migration *packaging UI*, not the job runner itself, which
//! this module fronts.

use std::path::PathBuf;

use axum::extract::{Extension, Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use cortex_common::request_id::RequestId;
use cortex_deploy::{JobKind, JobStatus, JobSummary};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth_middleware::AdminPrincipal;
use crate::error::GatewayError;
use crate::state::SharedState;

fn rid(request_id: &RequestId) -> String {
    request_id.as_str().to_string()
}

fn exports_dir(state: &SharedState) -> PathBuf {
    PathBuf::from(&state.env.models_dir).join("..").join("exports")
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JobAccepted {
    pub job_id: i64,
}

pub async fn export_instance(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<JobAccepted>, GatewayError> {
    let registry = state.registry.clone();
    let api_keys = state.api_keys.clone();
    let dir = exports_dir(&state);

    let job_id = state
        .jobs
        .submit(JobKind::ExportInstance, move |ctx| async move {
            ctx.set_step("collecting models and keys");
            let models = registry.list(&Default::default())?;
            let keys = api_keys.list()?;
            let manifest = serde_json::json!({ "models": models, "api_keys": keys });
            let bytes = serde_json::to_vec_pretty(&manifest)?;

            tokio::fs::create_dir_all(&dir).await?;
            let path = dir.join(format!("instance-{}.json", ctx.id()));
            ctx.set_total_bytes(bytes.len() as u64);
            tokio::fs::write(&path, &bytes).await?;
            ctx.add_bytes_written(bytes.len() as u64);
            ctx.set_progress(1.0);
            ctx.log(format!("wrote {}", path.display()));
            Ok(())
        })
        .map_err(|err| GatewayError::new(err, rid(&request_id)))?;

    Ok(Json(JobAccepted { job_id }))
}

pub async fn export_model(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Path(model_id): Path<i64>,
) -> Result<Json<JobAccepted>, GatewayError> {
    let registry = state.registry.clone();
    let dir = exports_dir(&state);

    let job_id = state
        .jobs
        .submit(JobKind::ExportModel { model_id }, move |ctx| async move {
            ctx.set_step("writing model manifest");
            let model = registry.get_by_id(model_id)?;
            let bytes = serde_json::to_vec_pretty(&model)?;

            tokio::fs::create_dir_all(&dir).await?;
            let path = dir.join(format!("model-{model_id}.json"));
            ctx.set_total_bytes(bytes.len() as u64);
            tokio::fs::write(&path, &bytes).await?;
            ctx.add_bytes_written(bytes.len() as u64);
            ctx.set_progress(1.0);
            ctx.log(format!("wrote {}", path.display()));
            Ok(())
        })
        .map_err(|err| GatewayError::new(err, rid(&request_id)))?;

    Ok(Json(JobAccepted { job_id }))
}

#[derive(Debug, Deserialize)]
pub struct ImportModelRequest {
    pub manifest_path: String,
}

pub async fn import_model(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<ImportModelRequest>,
) -> Result<Json<JobAccepted>, GatewayError> {
    let registry = state.registry.clone();
    let manifest_path = req.manifest_path.clone();

    let job_id = state
        .jobs
        .submit(JobKind::ImportModel { manifest_path: manifest_path.clone() }, move |ctx| async move {
            ctx.set_step("reading manifest");
            let bytes = tokio::fs::read(&manifest_path).await?;
            ctx.set_total_bytes(bytes.len() as u64);
            let new_model: cortex_registry::registry::NewModel = serde_json::from_slice(&bytes)?;
            ctx.add_bytes_written(bytes.len() as u64);
            ctx.set_step("creating model row");
            let model = registry.create(new_model)?;
            ctx.set_progress(1.0);
            ctx.log(format!("imported model {}", model.id));
            Ok(())
        })
        .map_err(|err| GatewayError::new(err, rid(&request_id)))?;

    Ok(Json(JobAccepted { job_id }))
}

#[derive(Debug, Deserialize)]
pub struct RestoreDatabaseRequest {
    pub archive_path: String,
}

/// The shape `database_dump` writes and `restore_database` reads back.
/// Missing tables default to empty rather than failing, so an archive
/// produced by `export_instance` (models + api_keys only) still restores.
#[derive(Debug, Default, Deserialize)]
struct DatabaseDump {
    #[serde(default)]
    models: Vec<cortex_values::model::Model>,
    #[serde(default)]
    api_keys: Vec<cortex_values::model::ApiKey>,
    #[serde(default)]
    users: Vec<cortex_values::User>,
    #[serde(default)]
    organizations: Vec<cortex_values::Organization>,
}

/// Replaces the contents of `tree` with `rows`, keyed by `key_of` (spec.md
/// §4.10: restore is a real long-running operation, not a verify-only
/// stub). Original row ids are preserved so foreign keys elsewhere in the
/// archive (e.g. a usage record's `key_id`) keep resolving after restore.
fn replace_tree<T: serde::Serialize>(
    tree: &sled::Tree,
    rows: &[T],
    key_of: impl Fn(&T) -> i64,
) -> anyhow::Result<u64> {
    tree.clear()?;
    let mut bytes_written = 0u64;
    for row in rows {
        let key = key_of(row).to_be_bytes();
        let bytes = serde_json::to_vec(row)?;
        bytes_written += bytes.len() as u64;
        tree.insert(key, bytes)?;
    }
    Ok(bytes_written)
}

pub async fn restore_database(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<RestoreDatabaseRequest>,
) -> Result<Json<JobAccepted>, GatewayError> {
    let archive_path = req.archive_path.clone();
    let store = state.store.clone();

    let job_id = state
        .jobs
        .submit(JobKind::RestoreDatabase { archive_path: archive_path.clone() }, move |ctx| async move {
            ctx.set_step("reading archive");
            let bytes = tokio::fs::read(&archive_path).await?;
            ctx.set_total_bytes(bytes.len() as u64);
            let dump: DatabaseDump = serde_json::from_slice(&bytes)?;

            ctx.set_step("restoring models");
            let written = replace_tree(&store.models()?, &dump.models, |m| m.id)?;
            ctx.add_bytes_written(written);

            ctx.set_step("restoring api keys");
            let written = replace_tree(&store.api_keys()?, &dump.api_keys, |k| k.id)?;
            ctx.add_bytes_written(written);

            ctx.set_step("restoring users");
            let written = replace_tree(&store.open_tree("users")?, &dump.users, |u| u.id)?;
            ctx.add_bytes_written(written);

            ctx.set_step("restoring organizations");
            let written = replace_tree(&store.open_tree("organizations")?, &dump.organizations, |o| o.id)?;
            ctx.add_bytes_written(written);

            ctx.set_progress(1.0);
            ctx.log(format!(
                "restored {} models, {} api keys, {} users, {} organizations from {archive_path}",
                dump.models.len(),
                dump.api_keys.len(),
                dump.users.len(),
                dump.organizations.len(),
            ));
            Ok(())
        })
        .map_err(|err| GatewayError::new(err, rid(&request_id)))?;

    Ok(Json(JobAccepted { job_id }))
}

#[derive(Debug, Deserialize)]
pub struct EstimateSizeRequest {
    pub folder: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EstimateSizeResponse {
    pub total_bytes: u64,
}

/// `POST /admin/deployment/estimate-size` (spec.md §6): synchronous,
/// unlike the export/import/restore endpoints — it's a filesystem read,
/// not a job worth tracking.
pub async fn estimate_size(
    AdminPrincipal(_principal): AdminPrincipal,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<EstimateSizeRequest>,
) -> Result<Json<EstimateSizeResponse>, GatewayError> {
    let report = cortex_inspector::inspect_folder(std::path::Path::new(&req.folder))
        .map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(Json(EstimateSizeResponse { total_bytes: report.total_bytes }))
}

#[derive(Debug, Deserialize)]
pub struct JobIdQuery {
    pub job_id: i64,
}

pub async fn deployment_status(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<JobIdQuery>,
) -> Result<Json<JobSummary>, GatewayError> {
    let summary = state.jobs.status(query.job_id).map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(Json(summary))
}

#[derive(Debug, Serialize)]
pub struct DeploymentOptions {
    pub job_kinds: Vec<&'static str>,
    pub statuses: Vec<&'static str>,
}

pub async fn deployment_options(AdminPrincipal(_principal): AdminPrincipal) -> Json<DeploymentOptions> {
    Json(DeploymentOptions {
        job_kinds: vec!["export_instance", "export_model", "import_model", "restore_database"],
        statuses: vec!["pending", "running", "completed", "failed", "cancelled"],
    })
}

pub async fn deployment_jobs(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<Vec<JobSummary>>, GatewayError> {
    let jobs = state.jobs.list().map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(Json(jobs))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ManifestEntry {
    pub name: String,
    pub path: String,
    pub bytes: u64,
}

pub async fn model_manifests(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
) -> Json<Vec<ManifestEntry>> {
    let dir = exports_dir(&state);
    let mut entries = Vec::new();
    if let Ok(mut read_dir) = tokio::fs::read_dir(&dir).await {
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            if let Ok(metadata) = entry.metadata().await {
                if metadata.is_file() {
                    entries.push(ManifestEntry {
                        name: entry.file_name().to_string_lossy().to_string(),
                        path: entry.path().display().to_string(),
                        bytes: metadata.len(),
                    });
                }
            }
        }
    }
    Json(entries)
}

/// `GET /admin/deployment/database-dump` (spec.md §6): a full JSON dump of
/// every durable table, for an operator taking a manual snapshot outside
/// the job runner.
pub async fn database_dump(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Response, GatewayError> {
    let models = state.registry.list(&Default::default()).map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    let keys = state.api_keys.list().map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    let users = state.users.list().map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    let organizations = state.organizations.list().map_err(|err| GatewayError::new(err, rid(&request_id)))?;

    let dump = serde_json::json!({
        "models": models,
        "api_keys": keys,
        "users": users,
        "organizations": organizations,
    });

    let mut response = Json(dump).into_response();
    response.headers_mut().insert(
        axum::http::header::CONTENT_DISPOSITION,
        axum::http::HeaderValue::from_static("attachment; filename=\"cortex-database-dump.json\""),
    );
    Ok(response)
}

pub async fn cancel_job(
    AdminPrincipal(_principal): AdminPrincipal,
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<axum::http::StatusCode, GatewayError> {
    state.jobs.cancel(id).map_err(|err| GatewayError::new(err, rid(&request_id)))?;
    Ok(axum::http::StatusCode::ACCEPTED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: i64,
        value: String,
    }

    fn temp_tree() -> sled::Tree {
        let db = sled::Config::new().temporary(true).open().unwrap();
        db.open_tree("rows").unwrap()
    }

    #[test]
    fn replace_tree_writes_rows_keyed_by_their_original_id() {
        let tree = temp_tree();
        let rows = vec![
            Row { id: 7, value: "a".into() },
            Row { id: 3, value: "b".into() },
        ];

        let written = replace_tree(&tree, &rows, |r| r.id).unwrap();
        assert!(written > 0);

        let stored: Row = serde_json::from_slice(&tree.get(7i64.to_be_bytes()).unwrap().unwrap()).unwrap();
        assert_eq!(stored, rows[0]);
        let stored: Row = serde_json::from_slice(&tree.get(3i64.to_be_bytes()).unwrap().unwrap()).unwrap();
        assert_eq!(stored, rows[1]);
    }

    /// A restore must actually overwrite prior contents rather than merge
    /// with them — otherwise rows deleted since the archive was taken would
    /// survive the restore.
    #[test]
    fn replace_tree_clears_rows_absent_from_the_new_set() {
        let tree = temp_tree();
        replace_tree(&tree, &[Row { id: 1, value: "old".into() }], |r| r.id).unwrap();
        assert!(tree.get(1i64.to_be_bytes()).unwrap().is_some());

        replace_tree(&tree, &[Row { id: 2, value: "new".into() }], |r| r.id).unwrap();

        assert!(tree.get(1i64.to_be_bytes()).unwrap().is_none());
        assert!(tree.get(2i64.to_be_bytes()).unwrap().is_some());
    }

    #[test]
    fn replace_tree_on_an_empty_set_clears_the_tree() {
        let tree = temp_tree();
        replace_tree(&tree, &[Row { id: 1, value: "old".into() }], |r| r.id).unwrap();

        let written = replace_tree::<Row>(&tree, &[], |r| r.id).unwrap();

        assert_eq!(written, 0);
        assert_eq!(tree.len(), 0);
    }
}
