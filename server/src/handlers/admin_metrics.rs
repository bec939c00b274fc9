//! GET /v1/admin/metrics (§6).

use std::sync::Arc;

use axum::{Extension, Json};
use cdp_core::types::AdminMetrics;

use crate::error::AppError;
use crate::state::AppState;

pub async fn metrics(Extension(state): Extension<Arc<AppState>>) -> Result<Json<AdminMetrics>, AppError> {
    let metrics = state.admin.metrics().await?;
    Ok(Json(metrics))
}
