//! Evaluation-time error type for the expression DSL.
//!
//! Parse errors ([`crate::parser::ParseError`]) carry source position and
//! are reported verbatim to callers (§4.1). Evaluation errors are caught by
//! the caller and turned into a policy-specific fallback (§4.1 "Failure
//! semantics": trait -> `null`, segment -> `false`, flag -> `allow=false`).

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("`in` requires an array right-hand side, got {0}")]
    InRequiresArray(String),

    #[error("property access on non-object value {0}")]
    PropertyAccessOnNonObject(String),
}
