//! Tree-walking evaluator for the expression DSL.
//!
//! The evaluator is dialect-agnostic: callers implement [`Env`] to bind free
//! identifiers for the trait dialect (`events`, `profile`,
//! `first_seen_days_ago`, `last_seen_minutes_ago`), the segment dialect (the
//! user's trait map), or the flag dialect (traits plus the textually
//! rewritten `segment("k")`/`trait("k")` calls - see the Decision Engine,
//! which owns that rewrite rather than this crate).

use std::collections::BTreeMap;

use crate::ast::{BinOp, Expr};
use crate::diagnostics::EvalError;
use cdp_types::Value;

/// The result of resolving an identifier or a `.field` step: either a
/// concrete value, a nested object of further bindings (e.g. `events` binds
/// to an object keyed by event name), or nothing bound at all. `Missing`
/// and `Value(Value::Null)` behave identically under further `.field`
/// access and at final value conversion - both become `null` - matching
/// §4.1 "Property access on null/missing yields null (no error)".
#[derive(Debug, Clone)]
pub enum Binding {
    Value(Value),
    Object(BTreeMap<String, Binding>),
    Missing,
}

impl Binding {
    pub fn object(fields: impl IntoIterator<Item = (String, Binding)>) -> Self {
        Binding::Object(fields.into_iter().collect())
    }
}

impl From<Value> for Binding {
    fn from(v: Value) -> Self {
        Binding::Value(v)
    }
}

/// Dialect-supplied identifier resolution. Implemented once per dialect in
/// `cdp-core`: `TraitEnv`, `SegmentEnv`, and the flag dialect reuses
/// `SegmentEnv` after the Decision Engine's textual rewrite.
pub trait Env {
    fn root(&self, name: &str) -> Binding;
}

fn eval_binding(expr: &Expr, env: &dyn Env) -> Result<Binding, EvalError> {
    match expr {
        Expr::Ident(name) => Ok(env.root(name)),
        Expr::FieldAccess(base, field) => match eval_binding(base, env)? {
            Binding::Missing => Ok(Binding::Missing),
            Binding::Value(Value::Null) => Ok(Binding::Missing),
            Binding::Value(other) => Err(EvalError::PropertyAccessOnNonObject(other.to_string())),
            Binding::Object(mut map) => Ok(map.remove(field).unwrap_or(Binding::Missing)),
        },
        other => unreachable!("eval_binding called on non-path expression {other:?}"),
    }
}

fn binding_to_value(binding: Binding) -> Value {
    match binding {
        Binding::Missing => Value::Null,
        Binding::Value(v) => v,
        // A bare object used where a value is expected (e.g. referencing
        // `events` directly rather than `events.x.y`) has no JSON
        // representation in this DSL; it is always falsy and compares
        // unequal to everything, so collapsing it to null is safe.
        Binding::Object(_) => Value::Null,
    }
}

/// Evaluate `expr` to a concrete [`Value`] against `env`.
pub fn eval(expr: &Expr, env: &dyn Env) -> Result<Value, EvalError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::String(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Array(items) => Ok(Value::Array(
            items.iter().map(|e| eval(e, env)).collect::<Result<_, _>>()?,
        )),
        Expr::Ident(_) | Expr::FieldAccess(_, _) => {
            Ok(binding_to_value(eval_binding(expr, env)?))
        }
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, env),
    }
}

fn eval_binary(op: BinOp, lhs: &Expr, rhs: &Expr, env: &dyn Env) -> Result<Value, EvalError> {
    match op {
        BinOp::Or => {
            let l = eval(lhs, env)?;
            if l.is_truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval(rhs, env)?.is_truthy()))
        }
        BinOp::And => {
            let l = eval(lhs, env)?;
            if !l.is_truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval(rhs, env)?.is_truthy()))
        }
        BinOp::Eq => Ok(Value::Bool(values_strictly_equal(
            &eval(lhs, env)?,
            &eval(rhs, env)?,
        ))),
        BinOp::Ne => Ok(Value::Bool(!values_strictly_equal(
            &eval(lhs, env)?,
            &eval(rhs, env)?,
        ))),
        BinOp::Gt | BinOp::Lt | BinOp::Ge | BinOp::Le => {
            let l = eval(lhs, env)?;
            let r = eval(rhs, env)?;
            let ln = numeric(&l)?;
            let rn = numeric(&r)?;
            let result = match op {
                BinOp::Gt => ln > rn,
                BinOp::Lt => ln < rn,
                BinOp::Ge => ln >= rn,
                BinOp::Le => ln <= rn,
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }
        BinOp::In => {
            let l = eval(lhs, env)?;
            let r = eval(rhs, env)?;
            match r {
                Value::Array(items) => Ok(Value::Bool(
                    items.iter().any(|item| values_strictly_equal(item, &l)),
                )),
                other => Err(EvalError::InRequiresArray(other.to_string())),
            }
        }
    }
}

fn numeric(v: &Value) -> Result<f64, EvalError> {
    v.as_number()
        .ok_or_else(|| EvalError::TypeMismatch(format!("expected number, got {v}")))
}

/// `==`/`!=` are strict: values of different shape are simply unequal, not
/// a type error (§4.1 "no numeric coercion; types must match").
fn values_strictly_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_strictly_equal(a, b))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    struct MapEnv(BTreeMap<&'static str, Binding>);

    impl Env for MapEnv {
        fn root(&self, name: &str) -> Binding {
            self.0
                .get(name)
                .map(|b| match b {
                    Binding::Value(v) => Binding::Value(v.clone()),
                    Binding::Object(m) => Binding::Object(m.clone()),
                    Binding::Missing => Binding::Missing,
                })
                .unwrap_or(Binding::Missing)
        }
    }

    fn eval_src(src: &str, env: &dyn Env) -> Result<Value, EvalError> {
        eval(&parse(src).unwrap().expr, env)
    }

    #[test]
    fn missing_event_name_yields_null_not_zero() {
        let env = MapEnv(BTreeMap::from([(
            "events",
            Binding::object([(
                "app_open".to_string(),
                Binding::object([("count_7d".to_string(), Binding::Value(Value::Number(3.0)))]),
            )]),
        )]));
        let v = eval_src("events.never_seen.count_7d", &env).unwrap();
        assert_eq!(v, Value::Null);
        assert!(!v.is_truthy());
    }

    #[test]
    fn in_with_non_array_is_evaluation_error() {
        let env = MapEnv(BTreeMap::new());
        let err = eval_src("1 in 2", &env).unwrap_err();
        assert!(matches!(err, EvalError::InRequiresArray(_)));
    }

    #[test]
    fn property_access_on_non_object_is_type_error() {
        let env = MapEnv(BTreeMap::from([("n", Binding::Value(Value::Number(1.0)))]));
        let err = eval_src("n.field", &env).unwrap_err();
        assert!(matches!(err, EvalError::PropertyAccessOnNonObject(_)));
    }

    #[test]
    fn property_access_on_null_is_null_not_error() {
        let env = MapEnv(BTreeMap::from([("n", Binding::Value(Value::Null))]));
        let v = eval_src("n.field", &env).unwrap();
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn strict_equality_does_not_coerce_types() {
        let env = MapEnv(BTreeMap::new());
        assert_eq!(eval_src(r#"1 == "1""#, &env).unwrap(), Value::Bool(false));
    }

    #[test]
    fn comparison_requires_numeric_operands() {
        let env = MapEnv(BTreeMap::new());
        let err = eval_src(r#""a" > "b""#, &env).unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch(_)));
    }

    #[test]
    fn short_circuit_or_and_and() {
        let env = MapEnv(BTreeMap::new());
        // rhs would error if evaluated; short-circuit must avoid it.
        assert_eq!(eval_src(r#"true || (1 in 2)"#, &env).unwrap(), Value::Bool(true));
        assert_eq!(eval_src(r#"false && (1 in 2)"#, &env).unwrap(), Value::Bool(false));
    }

    #[test]
    fn unknown_identifier_resolves_to_null() {
        let env = MapEnv(BTreeMap::new());
        assert_eq!(eval_src("unknown_trait", &env).unwrap(), Value::Null);
    }
}
