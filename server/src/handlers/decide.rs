//! GET /v1/decide?userId=&flag= (§6).

use std::sync::Arc;

use axum::{extract::Query, Extension, Json};
use cdp_core::decision;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecideQuery {
    pub user_id: uuid::Uuid,
    pub flag: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecideResponse {
    pub allow: bool,
    pub variant: Option<String>,
    pub reasons: Vec<String>,
    pub user_id: uuid::Uuid,
    pub flag: String,
}

pub async fn decide(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<DecideQuery>,
) -> Result<Json<DecideResponse>, AppError> {
    let decision = decision::decide(
        &state.decision_cache,
        &state.flag_defs,
        &state.user_traits,
        &state.user_segments,
        query.user_id,
        &query.flag,
    )
    .await?;

    Ok(Json(DecideResponse {
        allow: decision.allow,
        variant: decision.variant,
        reasons: decision.reasons,
        user_id: query.user_id,
        flag: query.flag,
    }))
}
