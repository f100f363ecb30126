//! CORS layer construction (spec.md §6's `CORS_ALLOW_ORIGINS` env var),
//! mirroring the teacher's `api/src/middleware/cors.rs`: a bare `*` means
//! "allow any origin", anything else is parsed as an explicit origin list.

use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};

pub fn cors_layer(allow_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any);

    if allow_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allow_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    layer.allow_origin(origins)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_entry_allows_any_origin() {
        // Smoke test only: `CorsLayer` doesn't expose its internal state for
        // direct assertion, so we just confirm construction doesn't panic
        // for both branches.
        let _ = cors_layer(&["*".to_string()]);
        let _ = cors_layer(&["https://example.com".to_string()]);
    }
}
