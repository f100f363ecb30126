//! `GET /v1/models`, `GET /v1/models/running`, `GET
//! /v1/models/{name}/constraints` (spec.md §4.6, §6): read-only views over
//! the registry, filtered to what the caller's scope may see.

use axum::extract::{Extension, Path, State};
use axum::Json;
use cortex_auth::{authenticate_api_key, require_scope};
use cortex_common::request_id::RequestId;
use cortex_registry::ModelFilters;
use cortex_values::model::{ApiKeyScope, ModelState};
use cortex_values::openai::{ModelConstraints, ModelSummary};

use crate::error::GatewayError;
use crate::state::SharedState;

fn authenticate(state: &SharedState, headers: &axum::http::HeaderMap, request_id: &str) -> Result<(), GatewayError> {
    let principal = authenticate_api_key(
        headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()),
        &state.api_keys,
        state.env.dev_allow_all_keys,
    )
    .map_err(|err| GatewayError::new(err, request_id.to_string()))?;
    require_scope(&principal, ApiKeyScope::ChatCompletions)
        .map_err(|err| GatewayError::new(err, request_id.to_string()))
}

pub async fn list_models(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    headers: axum::http::HeaderMap,
) -> Result<Json<Vec<ModelSummary>>, GatewayError> {
    let request_id = request_id.as_str().to_string();
    authenticate(&state, &headers, &request_id)?;

    let models = state
        .registry
        .list(&ModelFilters::default())
        .map_err(|err| GatewayError::new(err, request_id.clone()))?;

    Ok(Json(
        models
            .into_iter()
            .filter(|m| m.state != ModelState::Archived)
            .map(|m| ModelSummary {
                served_name: m.served_name,
                engine_kind: m.engine_kind.as_str().to_string(),
                state: format!("{:?}", m.state).to_lowercase(),
            })
            .collect(),
    ))
}

pub async fn list_running_models(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    headers: axum::http::HeaderMap,
) -> Result<Json<Vec<ModelSummary>>, GatewayError> {
    let request_id = request_id.as_str().to_string();
    authenticate(&state, &headers, &request_id)?;

    let filters = ModelFilters { state: Some(ModelState::Running), ..Default::default() };
    let models = state
        .registry
        .list(&filters)
        .map_err(|err| GatewayError::new(err, request_id.clone()))?;

    Ok(Json(
        models
            .into_iter()
            .map(|m| ModelSummary {
                served_name: m.served_name,
                engine_kind: m.engine_kind.as_str().to_string(),
                state: format!("{:?}", m.state).to_lowercase(),
            })
            .collect(),
    ))
}

pub async fn model_constraints(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    headers: axum::http::HeaderMap,
    Path(served_name): Path<String>,
) -> Result<Json<ModelConstraints>, GatewayError> {
    let request_id = request_id.as_str().to_string();
    authenticate(&state, &headers, &request_id)?;

    let model = state
        .registry
        .get_by_served_name(&served_name)
        .map_err(|err| GatewayError::new(err, request_id.clone()))?;

    Ok(Json(ModelConstraints {
        served_name: model.served_name,
        context_length: model.config.context_length,
        supports_streaming: true,
        default_max_tokens: model.config.max_num_batched_tokens,
    }))
}
