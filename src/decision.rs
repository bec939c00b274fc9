//! Decision Engine (§4.6).
//!
//! Resolves `(userId, flagKey)` to an allow/deny decision through the
//! cache, the flag's rule, and the user's trait/segment state, rewriting
//! `segment("k")`/`trait("k")` calls into DSL literals before handing the
//! rule to `cdp_dsl`. The rewrite is a hand-rolled scan over the rule
//! text, not a regex, per the explicit requirement in §9 - `cdp_dsl`'s own
//! lexemes (`identifier`, `string_literal`) are reused so the scan agrees
//! with the grammar about what counts as an identifier or a quoted
//! string.

use std::collections::BTreeMap;
use std::sync::Arc;

use cdp_dsl::{eval, parse, Binding, Env};
use cdp_types::{Timestamp, UserId, Value};

use crate::cache::{CacheEntry, DecisionCache};
use crate::error::{CdpError, Result};
use crate::ports::{FlagDefStore, UserSegmentStore, UserTraitStore};

#[derive(Debug, Clone)]
pub struct Decision {
    pub allow: bool,
    /// Always `None`: the current rule grammar produces only a boolean
    /// `allow` (§4.6 "Variant").
    pub variant: Option<String>,
    pub reasons: Vec<String>,
}

struct RewriteResult {
    rule: String,
    reasons: Vec<String>,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Scan forward from `pos` (just past a `segment`/`trait` identifier) for
/// `( "…" )`, tolerating whitespace around the parens and the string.
/// Returns the literal key and the position immediately after the
/// closing paren; `None` leaves the input untouched if the shape doesn't
/// match (the identifier is then just a free identifier, same as any
/// other dialect).
fn try_match_call(chars: &[char], mut pos: usize) -> Option<(String, usize)> {
    while chars.get(pos).is_some_and(|c| c.is_whitespace()) {
        pos += 1;
    }
    if chars.get(pos) != Some(&'(') {
        return None;
    }
    pos += 1;
    while chars.get(pos).is_some_and(|c| c.is_whitespace()) {
        pos += 1;
    }
    if chars.get(pos) != Some(&'"') {
        return None;
    }
    let (key, after_string) = parse_string_literal(chars, pos)?;
    pos = after_string;
    while chars.get(pos).is_some_and(|c| c.is_whitespace()) {
        pos += 1;
    }
    if chars.get(pos) != Some(&')') {
        return None;
    }
    pos += 1;
    Some((key, pos))
}

/// Parse a `"…"` literal starting at `pos` (must point at the opening
/// quote), honoring the same `\\`, `\"`, `\n`, `\t` escapes as
/// `cdp_dsl::lexer::string_literal`. Returns the decoded content and the
/// position after the closing quote.
fn parse_string_literal(chars: &[char], pos: usize) -> Option<(String, usize)> {
    debug_assert_eq!(chars.get(pos), Some(&'"'));
    let mut i = pos + 1;
    let mut out = String::new();
    loop {
        match chars.get(i)? {
            '"' => return Some((out, i + 1)),
            '\\' => {
                let escaped = chars.get(i + 1)?;
                out.push(match escaped {
                    '\\' => '\\',
                    '"' => '"',
                    'n' => '\n',
                    't' => '\t',
                    other => *other,
                });
                i += 2;
            }
            c => {
                out.push(*c);
                i += 1;
            }
        }
    }
}

fn rewrite(rule: &str, segments: &BTreeMap<String, bool>, traits: &BTreeMap<String, Value>) -> RewriteResult {
    let chars: Vec<char> = rule.chars().collect();
    let mut out = String::with_capacity(rule.len());
    let mut reasons = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '"' {
            let start = i;
            if let Some((_, end)) = parse_string_literal(&chars, i) {
                out.extend(&chars[start..end]);
                i = end;
                continue;
            }
            out.push(c);
            i += 1;
            continue;
        }

        if is_ident_start(c) {
            let start = i;
            let mut j = i + 1;
            while j < chars.len() && is_ident_continue(chars[j]) {
                j += 1;
            }
            let ident: String = chars[start..j].iter().collect();

            if ident == "segment" || ident == "trait" {
                if let Some((key, end)) = try_match_call(&chars, j) {
                    let literal = if ident == "segment" {
                        let member = segments.get(&key).copied().unwrap_or(false);
                        reasons.push(format!("segment({key}) = {member}"));
                        member.to_string()
                    } else {
                        let value = traits.get(&key).cloned().unwrap_or(Value::Null);
                        reasons.push(format!("trait({key}) = {value}"));
                        value.to_dsl_literal()
                    };
                    out.push_str(&literal);
                    i = end;
                    continue;
                }
            }

            out.push_str(&ident);
            i = j;
            continue;
        }

        out.push(c);
        i += 1;
    }

    RewriteResult { rule: out, reasons }
}

/// Flag dialect environment, post-rewrite: free identifiers resolve
/// against the user's trait map exactly as the segment dialect does
/// (§4.1 "As segment dialect, plus...").
struct FlagContext<'a> {
    traits: &'a BTreeMap<String, Value>,
}

impl Env for FlagContext<'_> {
    fn root(&self, name: &str) -> Binding {
        match self.traits.get(name) {
            Some(v) => Binding::Value(v.clone()),
            None => Binding::Missing,
        }
    }
}

pub async fn decide(
    cache: &Arc<DecisionCache>,
    flag_defs: &Arc<dyn FlagDefStore>,
    user_traits: &Arc<dyn UserTraitStore>,
    user_segments: &Arc<dyn UserSegmentStore>,
    user_id: UserId,
    flag_key: &str,
) -> Result<Decision> {
    if let Some(cached) = cache.get(user_id, flag_key) {
        return Ok(Decision {
            allow: cached.allow,
            variant: cached.variant,
            reasons: cached.reasons,
        });
    }

    let def = flag_defs
        .get(flag_key)
        .await?
        .ok_or_else(|| CdpError::NotFound(format!("flag not found: {flag_key}")))?;

    let traits: BTreeMap<String, Value> = user_traits
        .get_all(user_id)
        .await?
        .into_iter()
        .map(|(k, row)| (k, row.value))
        .collect();
    let segments: BTreeMap<String, bool> = user_segments
        .get_all(user_id)
        .await?
        .into_iter()
        .map(|(k, row)| (k, row.in_segment))
        .collect();

    let rewritten = rewrite(&def.rule, &segments, &traits);

    let (allow, mut reasons) = match parse(&rewritten.rule) {
        Ok(parsed) => {
            let ctx = FlagContext { traits: &traits };
            match eval(&parsed.expr, &ctx) {
                Ok(value) => (value.is_truthy(), rewritten.reasons),
                Err(e) => {
                    let mut reasons = rewritten.reasons;
                    reasons.push(format!("evaluation_error: {e}"));
                    (false, reasons)
                }
            }
        }
        Err(e) => {
            let mut reasons = rewritten.reasons;
            reasons.push(format!("evaluation_error: {e}"));
            (false, reasons)
        }
    };
    reasons.sort();

    let decision = Decision {
        allow,
        variant: None,
        reasons,
    };

    cache.put(
        user_id,
        flag_key,
        CacheEntry {
            allow: decision.allow,
            variant: decision.variant.clone(),
            reasons: decision.reasons.clone(),
            expires_at: tokio::time::Instant::now() + cache.ttl(),
        },
    );

    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{InMemoryFlagDefStore, InMemoryUserSegmentStore, InMemoryUserTraitStore};
    use crate::types::UserSegment;

    fn now() -> Timestamp {
        chrono::Utc::now()
    }

    #[test]
    fn rewrite_replaces_segment_and_trait_calls_and_records_reasons() {
        let mut segments = BTreeMap::new();
        segments.insert("power_users".to_string(), true);
        let mut traits = BTreeMap::new();
        traits.insert("plan".to_string(), Value::String("pro".to_string()));

        let result = rewrite(
            r#"segment("power_users") && trait("plan") == "pro""#,
            &segments,
            &traits,
        );

        assert_eq!(result.rule, r#"true && "pro" == "pro""#);
        assert!(result.reasons.contains(&"segment(power_users) = true".to_string()));
        assert!(result.reasons.contains(&"trait(plan) = \"pro\"".to_string()));
    }

    #[test]
    fn rewrite_defaults_unknown_segment_to_false_and_unknown_trait_to_null() {
        let segments = BTreeMap::new();
        let traits = BTreeMap::new();
        let result = rewrite(r#"segment("ghost") || trait("ghost") == null"#, &segments, &traits);
        assert_eq!(result.rule, "false || null == null");
    }

    #[test]
    fn rewrite_does_not_touch_segment_like_text_inside_string_literals() {
        let segments = BTreeMap::new();
        let traits = BTreeMap::new();
        let result = rewrite(r#""segment(\"x\")" == "literal""#, &segments, &traits);
        assert_eq!(result.rule, r#""segment(\"x\")" == "literal""#);
        assert!(result.reasons.is_empty());
    }

    #[tokio::test]
    async fn scenario_a_premium_features_allows_when_segment_true() {
        let cache = Arc::new(DecisionCache::default());
        let flag_defs = Arc::new(InMemoryFlagDefStore::default());
        flag_defs.set("premium_features", r#"segment("power_users")"#);
        let flag_defs: Arc<dyn FlagDefStore> = flag_defs;
        let user_traits: Arc<dyn UserTraitStore> = Arc::new(InMemoryUserTraitStore::default());
        let user_segments: Arc<dyn UserSegmentStore> = Arc::new(InMemoryUserSegmentStore::default());

        let user_id = uuid::Uuid::new_v4();
        let t0 = now();
        user_segments
            .upsert_all(
                user_id,
                vec![UserSegment {
                    user_id,
                    key: "power_users".to_string(),
                    in_segment: true,
                    since: Some(t0),
                    updated_at: t0,
                }],
            )
            .await
            .unwrap();

        let decision = decide(
            &cache,
            &flag_defs,
            &user_traits,
            &user_segments,
            user_id,
            "premium_features",
        )
        .await
        .unwrap();

        assert!(decision.allow);
        assert!(decision.reasons.contains(&"segment(power_users) = true".to_string()));
    }

    #[tokio::test]
    async fn unknown_flag_is_not_found() {
        let cache = Arc::new(DecisionCache::default());
        let flag_defs: Arc<dyn FlagDefStore> = Arc::new(InMemoryFlagDefStore::default());
        let user_traits: Arc<dyn UserTraitStore> = Arc::new(InMemoryUserTraitStore::default());
        let user_segments: Arc<dyn UserSegmentStore> = Arc::new(InMemoryUserSegmentStore::default());

        let err = decide(
            &cache,
            &flag_defs,
            &user_traits,
            &user_segments,
            uuid::Uuid::new_v4(),
            "nonexistent",
        )
        .await
        .unwrap_err();
        assert_eq!(err.http_status(), 404);
    }

    #[tokio::test]
    async fn evaluation_error_yields_allow_false_with_reason() {
        let cache = Arc::new(DecisionCache::default());
        let flag_defs = Arc::new(InMemoryFlagDefStore::default());
        flag_defs.set("bad", "1 in 2");
        let flag_defs: Arc<dyn FlagDefStore> = flag_defs;
        let user_traits: Arc<dyn UserTraitStore> = Arc::new(InMemoryUserTraitStore::default());
        let user_segments: Arc<dyn UserSegmentStore> = Arc::new(InMemoryUserSegmentStore::default());

        let decision = decide(
            &cache,
            &flag_defs,
            &user_traits,
            &user_segments,
            uuid::Uuid::new_v4(),
            "bad",
        )
        .await
        .unwrap();

        assert!(!decision.allow);
        assert!(decision.reasons.iter().any(|r| r.starts_with("evaluation_error:")));
    }

    #[tokio::test]
    async fn scenario_c_stale_decision_survives_definition_change_until_ttl_or_invalidation() {
        tokio::time::pause();
        let cache = Arc::new(DecisionCache::default());
        let flag_defs = Arc::new(InMemoryFlagDefStore::default());
        flag_defs.set("f", "true");
        let flag_defs_trait: Arc<dyn FlagDefStore> = flag_defs.clone();
        let user_traits: Arc<dyn UserTraitStore> = Arc::new(InMemoryUserTraitStore::default());
        let user_segments: Arc<dyn UserSegmentStore> = Arc::new(InMemoryUserSegmentStore::default());
        let user_id = uuid::Uuid::new_v4();

        let first = decide(&cache, &flag_defs_trait, &user_traits, &user_segments, user_id, "f")
            .await
            .unwrap();
        assert!(first.allow);

        flag_defs.set("f", "false");
        let second = decide(&cache, &flag_defs_trait, &user_traits, &user_segments, user_id, "f")
            .await
            .unwrap();
        assert!(second.allow, "cached decision must survive a definition change until invalidated");

        cache.invalidate_one(user_id, "f");
        let third = decide(&cache, &flag_defs_trait, &user_traits, &user_segments, user_id, "f")
            .await
            .unwrap();
        assert!(!third.allow);
    }
}
