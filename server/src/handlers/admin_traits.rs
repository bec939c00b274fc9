//! Admin CRUD for trait definitions (§3 Ownership, §6 "…segments, flags
//! … analogous"). Deleting a definition cascades to every `UserTrait` row
//! carrying that key (§8 invariant 4).

use std::sync::Arc;

use axum::{extract::Path, http::StatusCode, Extension, Json};
use cdp_core::error::CdpError;
use cdp_core::types::is_valid_key;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTraitRequest {
    pub key: String,
    pub expression: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTraitRequest {
    pub expression: String,
}

#[derive(Debug, Serialize)]
pub struct TraitResponse {
    #[serde(rename = "trait")]
    pub trait_def: cdp_core::types::TraitDefinition,
}

#[derive(Debug, Serialize)]
pub struct TraitListResponse {
    pub traits: Vec<cdp_core::types::TraitDefinition>,
}

fn validate_key(key: &str) -> Result<(), AppError> {
    if !is_valid_key(key) {
        return Err(CdpError::InvalidInput(format!(
            "invalid key format: {key}"
        ))
        .into());
    }
    Ok(())
}

pub async fn list(Extension(state): Extension<Arc<AppState>>) -> Result<Json<TraitListResponse>, AppError> {
    let traits = state.trait_defs.list().await?;
    Ok(Json(TraitListResponse { traits }))
}

pub async fn create(
    Extension(state): Extension<Arc<AppState>>,
    Json(body): Json<CreateTraitRequest>,
) -> Result<Json<TraitResponse>, AppError> {
    validate_key(&body.key)?;
    if state.trait_defs.get(&body.key).await?.is_some() {
        return Err(CdpError::Conflict(format!("trait already exists: {}", body.key)).into());
    }
    let now = chrono::Utc::now();
    let trait_def = state.trait_defs.upsert(&body.key, &body.expression, now).await?;
    Ok(Json(TraitResponse { trait_def }))
}

pub async fn update(
    Extension(state): Extension<Arc<AppState>>,
    Path(key): Path<String>,
    Json(body): Json<UpdateTraitRequest>,
) -> Result<Json<TraitResponse>, AppError> {
    if state.trait_defs.get(&key).await?.is_none() {
        return Err(CdpError::NotFound(format!("trait not found: {key}")).into());
    }
    let now = chrono::Utc::now();
    let trait_def = state.trait_defs.upsert(&key, &body.expression, now).await?;
    Ok(Json(TraitResponse { trait_def }))
}

pub async fn delete(
    Extension(state): Extension<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<StatusCode, AppError> {
    let existed = state.trait_defs.delete(&key).await?;
    if !existed {
        return Err(CdpError::NotFound(format!("trait not found: {key}")).into());
    }
    state.user_traits.delete_by_key(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}
