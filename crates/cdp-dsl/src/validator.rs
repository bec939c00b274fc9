//! Expression validator.
//!
//! `validate(expr)` attempts a full parse and reports `{valid, error?}`
//! (§4.1). The DSL is dynamically typed, so validation never attempts to
//! type-check - a syntactically valid expression may still fail at
//! evaluation time (caught and policy-handled by the caller, not here).

use serde::{Deserialize, Serialize};

use crate::parser::parse;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub error: Option<String>,
}

pub fn validate(expr: &str) -> ValidationResult {
    match parse(expr) {
        Ok(_) => ValidationResult {
            valid: true,
            error: None,
        },
        Err(e) => ValidationResult {
            valid: false,
            error: Some(e.to_string()),
        },
    }
}
