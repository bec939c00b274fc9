//! Admin CRUD for segment definitions — analogous to `admin_traits` (§6
//! "…segments, flags | analogous"). Deleting a definition cascades to
//! every `UserSegment` row carrying that key (§8 invariant 4).

use std::sync::Arc;

use axum::{extract::Path, http::StatusCode, Extension, Json};
use cdp_core::error::CdpError;
use cdp_core::types::is_valid_key;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSegmentRequest {
    pub key: String,
    pub rule: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSegmentRequest {
    pub rule: String,
}

#[derive(Debug, serde::Serialize)]
pub struct SegmentResponse {
    #[serde(rename = "segment")]
    pub segment_def: cdp_core::types::SegmentDefinition,
}

#[derive(Debug, serde::Serialize)]
pub struct SegmentListResponse {
    pub segments: Vec<cdp_core::types::SegmentDefinition>,
}

fn validate_key(key: &str) -> Result<(), AppError> {
    if !is_valid_key(key) {
        return Err(CdpError::InvalidInput(format!("invalid key format: {key}")).into());
    }
    Ok(())
}

pub async fn list(Extension(state): Extension<Arc<AppState>>) -> Result<Json<SegmentListResponse>, AppError> {
    let segments = state.segment_defs.list().await?;
    Ok(Json(SegmentListResponse { segments }))
}

pub async fn create(
    Extension(state): Extension<Arc<AppState>>,
    Json(body): Json<CreateSegmentRequest>,
) -> Result<Json<SegmentResponse>, AppError> {
    validate_key(&body.key)?;
    if state.segment_defs.get(&body.key).await?.is_some() {
        return Err(CdpError::Conflict(format!("segment already exists: {}", body.key)).into());
    }
    let now = chrono::Utc::now();
    let segment_def = state.segment_defs.upsert(&body.key, &body.rule, now).await?;
    Ok(Json(SegmentResponse { segment_def }))
}

pub async fn update(
    Extension(state): Extension<Arc<AppState>>,
    Path(key): Path<String>,
    Json(body): Json<UpdateSegmentRequest>,
) -> Result<Json<SegmentResponse>, AppError> {
    if state.segment_defs.get(&key).await?.is_none() {
        return Err(CdpError::NotFound(format!("segment not found: {key}")).into());
    }
    let now = chrono::Utc::now();
    let segment_def = state.segment_defs.upsert(&key, &body.rule, now).await?;
    Ok(Json(SegmentResponse { segment_def }))
}

pub async fn delete(
    Extension(state): Extension<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<StatusCode, AppError> {
    let existed = state.segment_defs.delete(&key).await?;
    if !existed {
        return Err(CdpError::NotFound(format!("segment not found: {key}")).into());
    }
    state.user_segments.delete_by_key(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}
