//! Shared backend-dialing plumbing for the `/v1/*` handlers (spec.md
//! §4.6): header hygiene, the retry FSM, and upstream latency/selection
//! metrics recording. Streaming vs. non-streaming response handling lives
//! in each route module since the two shapes differ too much to share a
//! body.

use axum::http::{HeaderMap, HeaderValue};
use bytes::Bytes;
use cortex_common::error::{CortexError, ErrorKind};
use cortex_metrics::gateway_metrics;

use crate::middleware::strip_hop_by_hop;

/// Builds the outbound request headers: strips hop-by-hop headers from
/// whatever the client sent, forwards the rest, and injects the internal
/// backend auth header when configured (spec.md §4.6 step 2).
pub fn build_upstream_headers(client_headers: &HeaderMap, internal_backend_auth: Option<&str>) -> HeaderMap {
    let mut headers = client_headers.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(axum::http::header::HOST);
    headers.remove(axum::http::header::AUTHORIZATION);
    if let Some(token) = internal_backend_auth {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
            headers.insert(axum::http::header::AUTHORIZATION, value);
        }
    }
    headers
}

pub fn response_headers_for_client(upstream_headers: &HeaderMap) -> HeaderMap {
    let mut headers = upstream_headers.clone();
    strip_hop_by_hop(&mut headers);
    headers
}

/// Sends `request`, retrying at most once when the failure is a connection
/// error (spec.md §4.6 step 7): a `reqwest` connect error by construction
/// occurs before any response bytes exist, so this single rule correctly
/// covers both "idempotent GET: retry once on connection failure" and
/// "POST: retry only before the first upstream byte, and only on
/// connection errors" — there is never an already-received response to
/// retry past.
pub async fn send_with_retry(
    client: &reqwest::Client,
    request: reqwest::Request,
) -> Result<reqwest::Response, CortexError> {
    let retry_attempt = request.try_clone();

    match client.execute(clone_for_first_attempt(&request)?).await {
        Ok(response) => Ok(response),
        Err(err) if err.is_connect() => {
            gateway_metrics::record_upstream_selected("retry", request.url().as_str());
            match retry_attempt {
                Some(retry_request) => client.execute(retry_request).await.map_err(map_reqwest_error),
                None => Err(map_reqwest_error(err)),
            }
        }
        Err(err) => Err(map_reqwest_error(err)),
    }
}

/// `reqwest::Client::execute` consumes its `Request`; since we may need a
/// second attempt, clone before the first send rather than after a
/// failure (the first send still needs an owned `Request`).
fn clone_for_first_attempt(request: &reqwest::Request) -> Result<reqwest::Request, CortexError> {
    request
        .try_clone()
        .ok_or_else(|| CortexError::new(ErrorKind::InternalError, "request body is not clonable for retry"))
}

pub fn map_reqwest_error(err: reqwest::Error) -> CortexError {
    if err.is_timeout() {
        CortexError::new(ErrorKind::UpstreamTimeout, err.to_string())
    } else if err.is_connect() {
        CortexError::new(ErrorKind::UpstreamUnavailable, err.to_string())
    } else {
        CortexError::new(ErrorKind::UpstreamError, err.to_string())
    }
}

/// A single forwarded SSE byte chunk, tracked for usage/TTFT accounting
/// without ever parsing it as JSON (spec.md §4.6 step 6, §4.7).
#[derive(Debug, Default)]
pub struct StreamAccounting {
    pub bytes_forwarded: u64,
    pub first_byte_seen: bool,
}

impl StreamAccounting {
    pub fn observe(&mut self, chunk: &Bytes) {
        self.bytes_forwarded += chunk.len() as u64;
        if !self.first_byte_seen && chunk.windows(5).any(|w| w == b"data:") {
            self.first_byte_seen = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_accounting_flags_first_data_line() {
        let mut acc = StreamAccounting::default();
        acc.observe(&Bytes::from_static(b": keepalive\n\n"));
        assert!(!acc.first_byte_seen);
        acc.observe(&Bytes::from_static(b"data: {\"id\":1}\n\n"));
        assert!(acc.first_byte_seen);
        assert_eq!(acc.bytes_forwarded, 13 + 17);
    }
}
