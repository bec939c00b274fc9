//! CDP Types - Level 1 Foundation Types (Zero Workspace Dependencies)
//!
//! Pure data structures shared by every layer of the customer data platform:
//! the dynamically-typed [`Value`] that flows through the DSL engine and the
//! trait/segment/flag stores, source locations for parse diagnostics, and the
//! identifiers and event aggregates the trait dialect's environment exposes.
//!
//! ## Architecture Level: LEVEL 1 (Foundation)
//!
//! This is the bottom layer of the dependency hierarchy. `cdp-dsl`,
//! `cdp-core`, and `cdp-postgres` all depend on this crate; it depends on
//! nothing in the workspace.
//!
//! ## Critical Rules
//!
//! 1. **NO BUSINESS LOGIC** - only data structures and simple conversions
//! 2. **NO WORKSPACE DEPENDENCIES**
//! 3. **SERIALIZABLE** - every type supports serde
//! 4. **THREAD SAFE** - every type is Send + Sync

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type UserId = uuid::Uuid;
pub type Timestamp = chrono::DateTime<chrono::Utc>;

// ============================================================================
// SOURCE LOCATION
// ============================================================================

/// Byte-offset span into DSL source text, used for parse diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Resolve this byte-offset span to a 1-based (line, column) pair.
    pub fn line_col(&self, source: &str) -> (u32, u32) {
        let mut line = 1u32;
        let mut col = 1u32;
        for (i, c) in source.char_indices() {
            if i >= self.start {
                break;
            }
            if c == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (line, col)
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

// ============================================================================
// VALUE - the dynamically-typed leaf of the DSL
// ============================================================================

/// A dynamically-typed value, as produced and consumed by the DSL engine and
/// persisted as the JSON leaf of a trait, segment membership, or flag
/// decision. Mirrors JSON's shape exactly (arrays are literal-only per the
/// DSL grammar; they never appear as evaluation results, but the variant
/// exists so array literals can be built and tested for membership).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
}

impl Value {
    /// DSL truthiness: falsy = false, 0, "", null, missing.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(_) => true,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Lexical representation used when rewriting `trait("k")` into a DSL
    /// literal (§4.6): strings are quoted with `\"`-escaping, numbers and
    /// booleans use their lexical form, everything else becomes `null`.
    pub fn to_dsl_literal(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Value::String(s) => format!("\"{}\"", escape_dsl_string(s)),
            Value::Array(_) => "null".to_string(),
        }
    }
}

fn escape_dsl_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
            // Objects do not round-trip through the DSL's Value; property
            // access on them is handled one level up via ProfileMap/EventMetric,
            // never as a bare Value. Collapse to null defensively.
            serde_json::Value::Object(_) => Value::Null,
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(a) => serde_json::Value::Array(a.into_iter().map(Into::into).collect()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_dsl_literal())
    }
}

// ============================================================================
// EVENT METRICS - trait dialect's `events.<name>.<metric>` aggregates
// ============================================================================

/// Precomputed aggregates for one event name, as exposed to trait
/// expressions via `events.<name>.<metric>`. A missing event name (never
/// seen) is represented by the absence of an entry in the context's
/// `events` map, not by a zeroed `EventMetric` - see §4.1 "Missing event
/// name yields `null` (not zero)".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct EventMetric {
    pub count_7d: i64,
    pub count_14d: i64,
    pub count_30d: i64,
    pub unique_days_7d: i64,
    pub unique_days_14d: i64,
    pub unique_days_30d: i64,
    /// -1 if the event has never occurred for this user.
    pub first_seen_days_ago: i64,
    /// -1 if the event has never occurred for this user.
    pub last_seen_days_ago: i64,
}

/// Free-form property bag carried on an event.
pub type Props = BTreeMap<String, serde_json::Value>;
