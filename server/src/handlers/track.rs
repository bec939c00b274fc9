//! POST /v1/track (§6).

use std::sync::Arc;

use axum::{Extension, Json};
use cdp_core::pipeline::TrackInput;
use cdp_core::types::AliasSet;
use cdp_types::{Props, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    pub device_id: Option<String>,
    pub external_id: Option<String>,
    pub email_hash: Option<String>,
    /// Accepted, unused — see `IdentifyRequest::user_id`.
    pub user_id: Option<uuid::Uuid>,
    pub event: String,
    pub ts: Option<Timestamp>,
    pub props: Option<Props>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackResponse {
    pub success: bool,
    pub event_id: i64,
}

pub async fn track(
    Extension(state): Extension<Arc<AppState>>,
    Json(body): Json<TrackRequest>,
) -> Result<Json<TrackResponse>, AppError> {
    let aliases = AliasSet {
        device_id: body.device_id,
        external_id: body.external_id,
        email_hash: body.email_hash,
    };
    let now = chrono::Utc::now();

    let outcome = state
        .pipeline
        .track(
            TrackInput {
                aliases,
                name: body.event,
                ts: body.ts,
                props: body.props,
            },
            now,
        )
        .await?;

    Ok(Json(TrackResponse {
        success: true,
        event_id: outcome.event.id,
    }))
}
