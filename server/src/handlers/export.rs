//! GET /v1/export/segment/:key (§6).
//!
//! The JSON contract of this endpoint is `{downloadUrl, filename,
//! userCount}` — the 3-way `identify`/`track`/`decide` + thin admin
//! surface this spec builds has no background export-job worker, so
//! `downloadUrl` points back at this same path with `?format=csv`, which
//! streams the CSV body directly instead of returning the JSON envelope.

use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use cdp_core::types::SegmentExportRow;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetaResponse {
    pub download_url: String,
    pub filename: String,
    pub user_count: i64,
}

const CSV_HEADER: &str =
    "user_id,created_at,in_segment,since,updated_at,device_id,external_id,email_hash";

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn fmt_ts(ts: cdp_types::Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn render_csv(rows: &[SegmentExportRow]) -> String {
    let mut out = String::new();
    out.push_str(CSV_HEADER);
    out.push('\n');
    for row in rows {
        let fields = [
            row.user_id.to_string(),
            fmt_ts(row.created_at),
            row.in_segment.to_string(),
            row.since.map(fmt_ts).unwrap_or_default(),
            fmt_ts(row.updated_at),
            row.device_id.clone().unwrap_or_default(),
            row.external_id.clone().unwrap_or_default(),
            row.email_hash.clone().unwrap_or_default(),
        ];
        out.push_str(
            &fields
                .iter()
                .map(|f| quote(f))
                .collect::<Vec<_>>()
                .join(","),
        );
        out.push('\n');
    }
    out
}

pub async fn export_segment(
    Extension(state): Extension<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let rows = state.admin.export_segment_members(&key).await?;
    let filename = format!("segment_{key}.csv");

    if query.format.as_deref() == Some("csv") {
        let body = render_csv(&rows);
        let content_disposition = format!("attachment; filename=\"{filename}\"");
        return Ok((
            [
                (header::CONTENT_TYPE, "text/csv".to_string()),
                (header::CONTENT_DISPOSITION, content_disposition),
            ],
            body,
        )
            .into_response());
    }

    Ok(Json(ExportMetaResponse {
        download_url: format!("/v1/export/segment/{key}?format=csv"),
        filename,
        user_count: rows.len() as i64,
    })
    .into_response())
}
