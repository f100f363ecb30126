//! `POST /v1/embeddings` (spec.md §4.6, §6): non-streaming only — there is
//! no SSE shape for embeddings in the OpenAI schema.

use std::time::Instant;

use axum::extract::{Extension, State};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use cortex_auth::{admit_request, authenticate_api_key, require_scope};
use cortex_common::request_id::RequestId;
use cortex_metrics::gateway_metrics;
use cortex_values::model::{ApiKeyScope, TaskKind, UsageRecord};
use cortex_values::openai::{EmbeddingsRequest, TokenUsage};

use crate::error::GatewayError;
use crate::proxy::{build_upstream_headers, map_reqwest_error, response_headers_for_client, send_with_retry};
use crate::request_id::RequestIdExt;
use crate::state::SharedState;

const ROUTE: &str = "/v1/embeddings";

pub async fn embeddings(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    headers: axum::http::HeaderMap,
    Json(req): Json<EmbeddingsRequest>,
) -> Result<Response, GatewayError> {
    let started = Instant::now();
    let request_id = request_id.as_str().to_string();

    let principal = authenticate_api_key(
        headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()),
        &state.api_keys,
        state.env.dev_allow_all_keys,
    )
    .map_err(|err| GatewayError::new(err, request_id.clone()))?;
    require_scope(&principal, ApiKeyScope::Embeddings)
        .map_err(|err| GatewayError::new(err, request_id.clone()))?;

    let key_id = match &principal {
        cortex_auth::Principal::ApiKey { key } => key.id,
        cortex_auth::Principal::Session { user_id, .. } => *user_id,
    };

    let guard = admit_request(&state.rate_limiter, &principal.rate_limit_identifier(), false)
        .map_err(|err| GatewayError::new(err, request_id.clone()))?;
    drop(guard);

    let (base_url, _resolved) = state
        .selector
        .resolve(&req.model)
        .map_err(|err| GatewayError::new(err, request_id.clone()))?;

    let upstream_headers = build_upstream_headers(&headers, state.env.internal_backend_auth.as_deref());
    let url = format!("{base_url}{ROUTE}");
    let built = state
        .http
        .post(&url)
        .headers(upstream_headers)
        .json(&req)
        .build()
        .map_err(|err| GatewayError::new(map_reqwest_error(err), request_id.clone()))?;

    let send_result = send_with_retry(&state.http, built).await;
    state.selector.record_outcome(&base_url, send_result.is_ok());

    let upstream = send_result.map_err(|err| {
        gateway_metrics::record_request(ROUTE, err.kind().code());
        GatewayError::new(err, request_id.clone())
    })?;
    gateway_metrics::record_upstream_selected(ROUTE, &base_url);

    let status = upstream.status();
    let upstream_headers = response_headers_for_client(upstream.headers());
    let body = upstream
        .bytes()
        .await
        .map_err(|err| GatewayError::new(map_reqwest_error(err), request_id.clone()))?;

    let prompt_tokens = TokenUsage::estimate(req.input.to_string().len(), 0).prompt_tokens;
    state.usage.record(UsageRecord {
        id: 0,
        key_id,
        served_name: req.model.clone(),
        task_kind: TaskKind::Embedding,
        prompt_tokens,
        completion_tokens: 0,
        total_tokens: prompt_tokens,
        latency_ms: started.elapsed().as_millis() as u64,
        http_status: status.as_u16(),
        request_id: request_id.clone(),
        created_at: Utc::now(),
    });

    gateway_metrics::record_request_latency(ROUTE, started.elapsed().as_secs_f64());

    let mut response = (status, body).into_response();
    *response.headers_mut() = upstream_headers;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.set_request_id_header(value);
    }
    Ok(response)
}
