//! `POST /v1/chat/completions` (spec.md §4.6, §6): the router's eight-step
//! per-request algorithm, specialized to chat completions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Extension, State};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use cortex_auth::{admit_request, authenticate_api_key, require_scope};
use cortex_common::request_id::RequestId;
use cortex_values::model::{ApiKeyScope, TaskKind, UsageRecord};
use cortex_values::openai::{v1_removed_parameter_warnings, ChatCompletionRequest, TokenUsage};
use cortex_metrics::gateway_metrics;

use crate::error::GatewayError;
use crate::proxy::{build_upstream_headers, map_reqwest_error, response_headers_for_client, send_with_retry};
use crate::request_id::RequestIdExt;
use crate::sse::{passthrough_body, UsageOnDropGuard};
use crate::state::SharedState;

const ROUTE: &str = "/v1/chat/completions";

pub async fn chat_completions(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    headers: axum::http::HeaderMap,
    Json(req): Json<ChatCompletionRequest>,
) -> Result<Response, GatewayError> {
    let started = Instant::now();
    let request_id = request_id.as_str().to_string();

    let principal = authenticate_api_key(
        headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()),
        &state.api_keys,
        state.env.dev_allow_all_keys,
    )
    .map_err(|err| GatewayError::new(err, request_id.clone()))?;
    require_scope(&principal, ApiKeyScope::ChatCompletions)
        .map_err(|err| GatewayError::new(err, request_id.clone()))?;

    let key_id = match &principal {
        cortex_auth::Principal::ApiKey { key } => key.id,
        cortex_auth::Principal::Session { user_id, .. } => *user_id,
    };

    let guard = admit_request(&state.rate_limiter, &principal.rate_limit_identifier(), req.stream)
        .map_err(|err| GatewayError::new(err, request_id.clone()))?;

    let warnings = v1_removed_parameter_warnings(&req);

    let (base_url, resolved) = state
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
    let _ = resolved;

    let upstream = send_result.map_err(|err| {
        gateway_metrics::record_request(ROUTE, err.kind().code());
        GatewayError::new(err, request_id.clone())
    })?;

    gateway_metrics::record_upstream_selected(ROUTE, &base_url);

    let prompt_chars: usize = req
        .messages
        .iter()
        .map(|m| m.content.to_string().len())
        .sum();
    let prompt_tokens = TokenUsage::estimate(prompt_chars, 0).prompt_tokens;

    let response = if req.stream {
        stream_response(state.clone(), upstream, key_id, req.model.clone(), request_id.clone(), prompt_tokens, started, warnings, guard)
    } else {
        // Non-streaming requests never acquire a concurrency slot (spec.md
        // §4.5 only caps streaming requests), so `guard` is always `None`
        // here and dropping it immediately is a no-op.
        drop(guard);
        buffered_response(state.clone(), upstream, key_id, req.model.clone(), request_id.clone(), prompt_tokens, started).await?
    };

    gateway_metrics::record_request_latency(ROUTE, started.elapsed().as_secs_f64());
    Ok(response)
}

async fn buffered_response(
    state: SharedState,
    upstream: reqwest::Response,
    key_id: i64,
    served_name: String,
    request_id: String,
    prompt_tokens: u64,
    started: Instant,
) -> Result<Response, GatewayError> {
    let status = upstream.status();
    let upstream_headers = response_headers_for_client(upstream.headers());
    let body = upstream.bytes().await.map_err(|err| {
        GatewayError::new(map_reqwest_error(err), request_id.clone())
    })?;

    let completion_tokens = serde_json::from_slice::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("usage").cloned())
        .and_then(|usage| serde_json::from_value::<TokenUsage>(usage).ok())
        .map(|usage| usage.completion_tokens)
        .unwrap_or_else(|| TokenUsage::estimate(0, body.len()).completion_tokens);

    state.usage.record(UsageRecord {
        id: 0,
        key_id,
        served_name,
        task_kind: TaskKind::ChatCompletion,
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens + completion_tokens,
        latency_ms: started.elapsed().as_millis() as u64,
        http_status: status.as_u16(),
        request_id: request_id.clone(),
        created_at: Utc::now(),
    });

    let mut response = (status, body).into_response();
    *response.headers_mut() = upstream_headers;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.set_request_id_header(value);
    }
    Ok(response)
}

fn stream_response(
    state: SharedState,
    upstream: reqwest::Response,
    key_id: i64,
    served_name: String,
    request_id: String,
    prompt_tokens: u64,
    started: Instant,
    warnings: Vec<String>,
    concurrency_guard: Option<cortex_auth::ConcurrencyGuard>,
) -> Response {
    let status = upstream.status();
    let mut response_headers = response_headers_for_client(upstream.headers());
    response_headers.insert(
        axum::http::header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );

    let guard = UsageOnDropGuard::new(
        state.usage.clone(),
        key_id,
        served_name,
        TaskKind::ChatCompletion,
        request_id.clone(),
        prompt_tokens,
        concurrency_guard,
    );

    let ttft_recorded = Arc::new(AtomicBool::new(false));
    let ttft_recorded_cb = ttft_recorded.clone();
    let body = passthrough_body(upstream, guard, move || {
        if !ttft_recorded_cb.swap(true, Ordering::Relaxed) {
            gateway_metrics::record_stream_ttft(ROUTE, started.elapsed().as_secs_f64());
        }
    });

    let mut response = Response::builder().status(status).body(body).expect("building streamed response");
    *response.headers_mut() = response_headers;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.set_request_id_header(value);
    }
    if !warnings.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&warnings.join("; ")) {
            response.headers_mut().insert("x-cortex-warnings", value);
        }
    }
    response
}
