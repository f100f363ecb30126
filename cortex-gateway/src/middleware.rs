//! Cross-cutting `axum::middleware::from_fn` layers: request id propagation
//! and the hop-by-hop header stripping the proxy applies on both legs of a
//! forwarded request (spec.md §4.6 step 2).

use axum::extract::Request;
use axum::http::{HeaderMap, HeaderName};
use axum::middleware::Next;
use axum::response::Response;
use cortex_common::request_id::RequestId;

use crate::request_id::{RequestIdExt, REQUEST_ID_HEADER};

/// Reads `x-request-id` off the inbound request (minting one if absent),
/// stashes it in request extensions for handlers and error mapping to
/// pick up, and stamps it back onto the outbound response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let id = RequestId::from_header_or_new(
        request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok()),
    );
    request.extensions_mut().insert(id.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = axum::http::HeaderValue::from_str(id.as_str()) {
        response.set_request_id_header(value);
    }
    response
}

/// Headers that must never be forwarded verbatim across a proxy hop
/// (spec.md §4.6 step 2), per RFC 7230 §6.1 plus `transfer-encoding`
/// (the gateway re-frames the body itself, so the backend's framing is
/// never meaningful downstream).
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
            headers.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn strips_every_hop_by_hop_header() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        strip_hop_by_hop(&mut headers);
        assert!(!headers.contains_key("connection"));
        assert!(!headers.contains_key("transfer-encoding"));
        assert!(headers.contains_key("content-type"));
    }
}
