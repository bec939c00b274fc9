//! Maps `CdpError` to the `{code, message, statusCode, details?}` response
//! shape (§6/§7).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cdp_core::error::CdpError;
use serde_json::json;

pub struct AppError(CdpError);

impl From<CdpError> for AppError {
    fn from(e: CdpError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = json!({
            "code": self.0.code(),
            "message": self.0.to_string(),
            "statusCode": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
