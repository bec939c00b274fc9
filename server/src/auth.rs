//! API-key authentication middleware (§3 APIKey, §6 "Required auth").
//!
//! `api_keys` is owned directly by this crate (see the migration comment
//! in `cdp-postgres/migrations/0001_init.sql`): the incoming `Bearer <key>`
//! header, or an `?apiKey=` query parameter, is sha256-hashed and looked
//! up by `key_hash`. Resolve a principal from the request, insert it into
//! request extensions, reject with 401 before the handler runs.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use cdp_core::principal::{ApiKeyKind, Principal};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::state::AppState;

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"code": "unauthorized", "message": message, "statusCode": 401})),
    )
        .into_response()
}

fn forbidden(message: String) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({"code": "forbidden", "message": message, "statusCode": 403})),
    )
        .into_response()
}

/// `?apiKey=...` is the last query parameter of interest, so a plain scan
/// for the `apiKey=` key is enough — no percent-decoding is attempted
/// since API keys are opaque tokens drawn from an alphanumeric alphabet.
fn api_key_from_query(query: &str) -> Option<&str> {
    query.split('&').find_map(|pair| pair.strip_prefix("apiKey="))
}

fn extract_raw_key(req: &Request) -> Option<String> {
    if let Some(header) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(header.to_string());
    }
    req.uri().query().and_then(api_key_from_query).map(str::to_string)
}

fn hash_key(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(digest)
}

async fn authenticate(state: &AppState, raw_key: &str) -> Result<Principal, Response> {
    let key_hash = hash_key(raw_key);
    let row: Option<(uuid::Uuid, String)> =
        sqlx::query_as("SELECT id, kind FROM api_keys WHERE key_hash = $1")
            .bind(&key_hash)
            .fetch_optional(&state.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "api key lookup failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"code": "internal", "message": "internal error", "statusCode": 500})),
                )
                    .into_response()
            })?;

    let Some((id, kind)) = row else {
        return Err(unauthorized("invalid API key"));
    };

    let kind = match kind.as_str() {
        "read" => ApiKeyKind::Read,
        "write" => ApiKeyKind::Write,
        "admin" => ApiKeyKind::Admin,
        other => {
            tracing::error!(kind = other, "unknown api key kind in database");
            return Err(unauthorized("invalid API key"));
        }
    };

    Ok(Principal::new(id.to_string(), kind))
}

async fn require_level(mut req: Request, next: Next, required: ApiKeyKind) -> Result<Response, Response> {
    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .cloned()
        .expect("AppState extension must be installed before auth middleware");

    let raw_key = extract_raw_key(&req).ok_or_else(|| {
        unauthorized("missing Authorization header or apiKey query parameter")
    })?;

    let principal = authenticate(&state, &raw_key).await?;
    principal
        .require(required)
        .map_err(|e| forbidden(e.to_string()))?;

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

pub async fn require_read(req: Request, next: Next) -> Result<Response, Response> {
    require_level(req, next, ApiKeyKind::Read).await
}

pub async fn require_write(req: Request, next: Next) -> Result<Response, Response> {
    require_level(req, next, ApiKeyKind::Write).await
}

pub async fn require_admin(req: Request, next: Next) -> Result<Response, Response> {
    require_level(req, next, ApiKeyKind::Admin).await
}
