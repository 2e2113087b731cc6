use super::{ApiError, AppState};
use crate::chat::IncomingMessage;
use crate::models::{Message, ModelConfig, Role};
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageRequest {
    pub content: String,
    pub role: Role,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub config: Option<ModelConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageResponse {
    pub user_message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant_message: Option<Message>,
}

/// GET /api/messages - All turns, oldest first
pub async fn list_messages(State(state): State<AppState>) -> Result<Json<Vec<Message>>, ApiError> {
    Ok(Json(state.list_messages().await?))
}

/// POST /api/messages - Store a turn and, for user turns, the model's reply
pub async fn create_message(
    State(state): State<AppState>,
    Json(request): Json<CreateMessageRequest>,
) -> Result<Json<CreateMessageResponse>, ApiError> {
    let exchange = state
        .handle_message(IncomingMessage {
            content: request.content,
            role: request.role,
            audio_url: request.audio_url,
            model: request.model,
            config: request.config,
        })
        .await?;

    Ok(Json(CreateMessageResponse {
        user_message: exchange.user_message,
        assistant_message: exchange.assistant_message,
    }))
}

/// DELETE /api/messages - Clear the conversation
pub async fn clear_messages(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.clear_messages().await?;
    Ok(StatusCode::NO_CONTENT)
}
