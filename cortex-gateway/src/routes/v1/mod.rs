//! The public `/v1/*` OpenAI-compatible surface (spec.md §4.6).

pub mod chat;
pub mod completions;
pub mod embeddings;
pub mod models;

use axum::routing::{get, post};
use axum::Router;

use crate::state::SharedState;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/chat/completions", post(chat::chat_completions))
        .route("/completions", post(completions::completions))
        .route("/embeddings", post(embeddings::embeddings))
        .route("/models", get(models::list_models))
        .route("/models/running", get(models::list_running_models))
        .route("/models/{name}/constraints", get(models::model_constraints))
}
