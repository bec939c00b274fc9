//! POST /v1/admin/validate (§6): `{expression, type}` -> `{valid, error?}`.
//!
//! `type` is accepted for parity with the three definition kinds even
//! though the DSL grammar and `validate()` are shared across all three —
//! only the dialect's free identifiers differ, and those are resolved at
//! evaluation time, not at parse/validate time.

use axum::Json;
use cdp_dsl::validate;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub expression: String,
    #[serde(rename = "type")]
    pub kind: DefinitionKind,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    Trait,
    Segment,
    Flag,
}

pub async fn admin_validate(Json(body): Json<ValidateRequest>) -> Json<cdp_dsl::ValidationResult> {
    tracing::debug!(kind = ?body.kind, "validating expression");
    Json(validate(&body.expression))
}
