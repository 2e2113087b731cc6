//! HTTP adapters over [`ChatService`](crate::chat::ChatService).

pub mod error;
pub mod keys;
pub mod messages;
pub mod models;

pub use error::ApiError;

use crate::chat::ChatService;
use axum::{
    http::{header, Method},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub type AppState = Arc<ChatService>;

#[derive(serde::Serialize)]
struct Health {
    status: String,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "voicechat is working!".to_string(),
    })
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health))
        .route(
            "/api/messages",
            get(messages::list_messages)
                .post(messages::create_message)
                .delete(messages::clear_messages),
        )
        .route("/api/validate-key", post(keys::validate_key))
        .route("/api/models", get(models::list_models))
        .layer(cors)
        .with_state(state)
}
