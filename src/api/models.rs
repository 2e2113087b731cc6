use super::{ApiError, AppState};
use axum::{extract::State, Json};

/// GET /api/models - Models for the active key, or the fallback catalog
pub async fn list_models(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.available_models().await?))
}
