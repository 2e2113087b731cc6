use super::{ApiError, AppState};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateKeyRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateKeyResponse {
    pub valid: bool,
    pub models: Vec<String>,
}

/// POST /api/validate-key - Check a key against the provider and adopt it if it works
pub async fn validate_key(
    State(state): State<AppState>,
    Json(request): Json<ValidateKeyRequest>,
) -> Result<Json<ValidateKeyResponse>, ApiError> {
    let result = state.validate_key(&request.api_key).await?;
    Ok(Json(ValidateKeyResponse {
        valid: result.valid,
        models: result.models,
    }))
}
