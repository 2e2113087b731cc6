use crate::chat::ChatError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// [`ChatError`] rendered as a JSON error body.
#[derive(Debug)]
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(error: ChatError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            ChatError::InvalidRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ChatError::Internal(e) => {
                error!("Request failed: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Failed to process message" })),
                )
                    .into_response()
            }
            // The user turn is stored; the client can retry with another model.
            ChatError::Reply {
                model,
                source,
                user_message,
            } => (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "Failed to get AI response",
                    "details": source.to_string(),
                    "model": model,
                    "suggestModelSwitch": true,
                    "userMessage": user_message,
                })),
            )
                .into_response(),
        }
    }
}
