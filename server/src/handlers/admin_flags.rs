//! Admin CRUD for flag definitions — analogous to `admin_traits` (§6
//! "…segments, flags | analogous"). Flags have no per-user persisted row
//! to cascade-delete. Neither update nor delete purges the decision
//! cache (§9 Open Question 3, scenario C): a cached decision survives a
//! definition change until its TTL lapses or a caller invalidates it
//! explicitly through some other path — this repo codifies that as the
//! current behavior rather than silently fixing it.

use std::sync::Arc;

use axum::{extract::Path, http::StatusCode, Extension, Json};
use cdp_core::error::CdpError;
use cdp_core::types::is_valid_key;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateFlagRequest {
    pub key: String,
    pub rule: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFlagRequest {
    pub rule: String,
}

#[derive(Debug, serde::Serialize)]
pub struct FlagResponse {
    #[serde(rename = "flag")]
    pub flag_def: cdp_core::types::FlagDefinition,
}

#[derive(Debug, serde::Serialize)]
pub struct FlagListResponse {
    pub flags: Vec<cdp_core::types::FlagDefinition>,
}

fn validate_key(key: &str) -> Result<(), AppError> {
    if !is_valid_key(key) {
        return Err(CdpError::InvalidInput(format!("invalid key format: {key}")).into());
    }
    Ok(())
}

pub async fn list(Extension(state): Extension<Arc<AppState>>) -> Result<Json<FlagListResponse>, AppError> {
    let flags = state.flag_defs.list().await?;
    Ok(Json(FlagListResponse { flags }))
}

pub async fn create(
    Extension(state): Extension<Arc<AppState>>,
    Json(body): Json<CreateFlagRequest>,
) -> Result<Json<FlagResponse>, AppError> {
    validate_key(&body.key)?;
    if state.flag_defs.get(&body.key).await?.is_some() {
        return Err(CdpError::Conflict(format!("flag already exists: {}", body.key)).into());
    }
    let flag_def = state.flag_defs.upsert(&body.key, &body.rule).await?;
    Ok(Json(FlagResponse { flag_def }))
}

pub async fn update(
    Extension(state): Extension<Arc<AppState>>,
    Path(key): Path<String>,
    Json(body): Json<UpdateFlagRequest>,
) -> Result<Json<FlagResponse>, AppError> {
    if state.flag_defs.get(&key).await?.is_none() {
        return Err(CdpError::NotFound(format!("flag not found: {key}")).into());
    }
    let flag_def = state.flag_defs.upsert(&key, &body.rule).await?;
    Ok(Json(FlagResponse { flag_def }))
}

pub async fn delete(
    Extension(state): Extension<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<StatusCode, AppError> {
    let existed = state.flag_defs.delete(&key).await?;
    if !existed {
        return Err(CdpError::NotFound(format!("flag not found: {key}")).into());
    }
    Ok(StatusCode::NO_CONTENT)
}
