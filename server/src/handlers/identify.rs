//! POST /v1/identify (§6).

use std::sync::Arc;

use axum::{Extension, Json};
use cdp_core::types::AliasSet;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    pub device_id: Option<String>,
    pub external_id: Option<String>,
    pub email_hash: Option<String>,
    /// Accepted for forward compatibility with direct-by-id identify calls;
    /// this resolver only ever matches on alias, so a bare `userId` with no
    /// alias is rejected like any other empty alias set (§9 Open Question 1
    /// leaves pre-existing-user merging unimplemented; resolving by raw id
    /// would be a different, unaddressed feature).
    pub user_id: Option<uuid::Uuid>,
    /// Accepted but unused: the Trait Computer's profile map is empty (§9
    /// Open Question 2).
    #[serde(default)]
    pub traits: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyResponse {
    pub user_id: uuid::Uuid,
    pub success: bool,
}

pub async fn identify(
    Extension(state): Extension<Arc<AppState>>,
    Json(body): Json<IdentifyRequest>,
) -> Result<Json<IdentifyResponse>, AppError> {
    let aliases = AliasSet {
        device_id: body.device_id,
        external_id: body.external_id,
        email_hash: body.email_hash,
    };
    let now = chrono::Utc::now();
    let outcome = state.pipeline.identify(aliases, now).await?;

    Ok(Json(IdentifyResponse {
        user_id: outcome.user_id,
        success: true,
    }))
}
