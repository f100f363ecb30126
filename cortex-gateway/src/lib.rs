//! Request Router (C6): wires the public `/v1/*` surface, the admin
//! `/admin/*` surface, the Prometheus scrape endpoint, and the shared
//! middleware stack into a single `axum::Router` (spec.md §4.6, §6).

pub mod auth_middleware;
pub mod cors;
pub mod error;
pub mod middleware;
pub mod proxy;
pub mod request_id;
pub mod routes;
pub mod sse;
pub mod state;

use axum::routing::get;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::SharedState;

/// OpenAPI documentation for the admin surface. `paths()` is intentionally
/// empty (the handlers here aren't `utoipa::path`-annotated); Swagger UI
/// still renders the schema catalog, mirroring the teacher's own
/// not-yet-fully-wired `ApiDoc` in `api/src/routes/mod.rs`.
#[derive(OpenApi)]
#[openapi(
    info(title = "CORTEX Admin API", version = "0.1.0", description = "Self-hosted OpenAI-compatible inference gateway: admin surface"),
    paths(),
    components(schemas(
        routes::admin::models::LocalFolder,
        routes::admin::models::BaseDirResponse,
        routes::admin::system::Throughput,
        routes::admin::system::HostSummary,
        routes::admin::usage::SeriesPoint,
        routes::admin::usage::LatencyStats,
        routes::admin::usage::TtftStats,
        routes::admin::deployment::JobAccepted,
        routes::admin::deployment::EstimateSizeResponse,
        routes::admin::deployment::ManifestEntry,
    ))
)]
pub struct ApiDoc;

async fn metrics_endpoint(axum::extract::State(state): axum::extract::State<SharedState>) -> String {
    state.metrics_handle.render()
}

/// Builds the full router: CORS, tracing, compression, request-id
/// propagation, `/metrics`, `/v1/*`, `/admin/*`, and the Swagger UI.
/// `cortex-server`'s `main` calls this once at startup and serves it.
pub fn build_router(state: SharedState) -> Router {
    let cors = cors::cors_layer(&state.env.cors_allow_origins);
    let openapi = ApiDoc::openapi();

    Router::new()
        .route("/metrics", get(metrics_endpoint))
        .nest("/v1", routes::v1::router())
        .nest("/admin", routes::admin::router())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", openapi))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(false))
                .on_response(DefaultOnResponse::new()),
        )
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}
