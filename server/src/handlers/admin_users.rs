//! GET /v1/admin/users/search, GET /v1/admin/users/:id (§6).

use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    Extension, Json,
};
use cdp_core::error::CdpError;
use cdp_core::types::{UserDetail, UserSummary};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub users: Vec<UserSummary>,
    pub total: i64,
    pub has_more: bool,
}

pub async fn search(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    let (users, total) = state
        .admin
        .search_users(query.query.as_deref(), query.limit, query.offset)
        .await?;
    let has_more = query.offset + users.len() as i64 < total;

    Ok(Json(SearchResponse {
        users,
        total,
        has_more,
    }))
}

pub async fn get(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<uuid::Uuid>,
) -> Result<Json<UserDetail>, AppError> {
    let detail = state
        .admin
        .get_user(id)
        .await?
        .ok_or_else(|| CdpError::NotFound(format!("user not found: {id}")))?;
    Ok(Json(detail))
}
