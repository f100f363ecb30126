//! The session-or-admin-key-authenticated `/admin/*` surface (spec.md §6):
//! model lifecycle, API keys, users/orgs, system dashboards, usage
//! reporting, and deployment jobs.

pub mod deployment;
pub mod keys;
pub mod models;
pub mod system;
pub mod usage;
pub mod users;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::SharedState;

pub fn router() -> Router<SharedState> {
    Router::new()
        // models
        .route("/models", get(models::list_models).post(models::create_model))
        .route("/models/metrics", get(models::models_metrics))
        .route("/models/local-folders", get(models::local_folders))
        .route("/models/inspect-folder", get(models::inspect_folder_route))
        .route("/models/base-dir", get(models::get_base_dir).put(models::put_base_dir))
        .route(
            "/models/{id}",
            get(models::get_model).patch(models::update_model).delete(models::delete_model),
        )
        .route("/models/{id}/start", post(models::start_model))
        .route("/models/{id}/stop", post(models::stop_model))
        .route("/models/{id}/apply", post(models::apply_model))
        .route("/models/{id}/archive", post(models::archive_model))
        .route("/models/{id}/dry-run", post(models::dry_run_model))
        .route("/models/{id}/test", post(models::test_model))
        .route("/models/{id}/logs", get(models::model_logs))
        // api keys
        .route("/keys", get(keys::list_keys).post(keys::create_key))
        .route("/keys/lookup", get(keys::lookup_key))
        .route(
            "/keys/{id}",
            get(keys::get_key).patch(keys::update_key).delete(keys::delete_key),
        )
        // users / organizations
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/lookup", get(users::lookup_user))
        .route(
            "/users/{id}",
            get(users::get_user).patch(users::update_user).delete(users::delete_user),
        )
        .route("/organizations", get(users::list_organizations).post(users::create_organization))
        .route("/organizations/lookup", get(users::lookup_organization))
        .route(
            "/organizations/{id}",
            get(users::get_organization).patch(users::update_organization).delete(users::delete_organization),
        )
        // system
        .route("/system/capabilities", get(system::capabilities))
        .route("/system/throughput", get(system::throughput))
        .route("/system/host/summary", get(system::host_summary))
        .route("/system/host/trends", get(system::host_trends))
        .route("/system/gpus", get(system::gpus))
        // usage
        .route("/usage", get(usage::list_usage))
        .route("/usage/series", get(usage::usage_series))
        .route("/usage/aggregate", get(usage::usage_aggregate))
        .route("/usage/latency", get(usage::usage_latency))
        .route("/usage/ttft", get(usage::usage_ttft))
        .route("/usage/export", get(usage::usage_export))
        // deployment
        .route("/deployment/export", post(deployment::export_instance))
        .route("/deployment/export-model/{id}", post(deployment::export_model))
        .route("/deployment/import-model", post(deployment::import_model))
        .route("/deployment/restore-database", post(deployment::restore_database))
        .route("/deployment/estimate-size", post(deployment::estimate_size))
        .route("/deployment/status", get(deployment::deployment_status))
        .route("/deployment/options", get(deployment::deployment_options))
        .route("/deployment/jobs", get(deployment::deployment_jobs))
        .route("/deployment/jobs/{id}", delete(deployment::cancel_job))
        .route("/deployment/model-manifests", get(deployment::model_manifests))
        .route("/deployment/database-dump", get(deployment::database_dump))
}
