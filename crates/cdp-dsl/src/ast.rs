//! AST types for the expression DSL shared by traits, segments, and flags.
//!
//! The grammar (precedence low -> high):
//!
//! ```text
//! or_expr   := and_expr ('||' and_expr)*
//! and_expr  := compare ('&&' compare)*
//! compare   := factor (('in' | '==' | '!=' | '>' | '<' | '>=' | '<=') factor)*
//! factor    := NUMBER | STRING | 'true' | 'false'
//!            | primary ('.' IDENT)*
//!            | '(' or_expr ')'
//!            | '[' (or_expr (',' or_expr)*)? ']'
//! primary   := IDENT
//! ```
//!
//! `compare` is left-associative and chains (`a == b == c` parses as
//! `((a == b) == c)`) - this is a documented quirk of the grammar, not a bug.

use cdp_types::SourceSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    In,
}

impl BinOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinOp::Or => "||",
            BinOp::And => "&&",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Gt => ">",
            BinOp::Lt => "<",
            BinOp::Ge => ">=",
            BinOp::Le => "<=",
            BinOp::In => "in",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    String(String),
    Bool(bool),
    Array(Vec<Expr>),
    /// A bare identifier, e.g. `events` or `power_user`.
    Ident(String),
    /// `base.field`, left-associative chain collapsed during parse into
    /// nested `FieldAccess` nodes (`events.app_open.count_7d` becomes
    /// `FieldAccess(FieldAccess(Ident("events"), "app_open"), "count_7d")`).
    FieldAccess(Box<Expr>, String),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

/// A parsed expression together with the span of its full source text, used
/// to report evaluation errors with position context.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub expr: Expr,
    pub span: SourceSpan,
}
