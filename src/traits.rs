//! Trait Computer (§4.4).
//!
//! Builds a `TraitContext` from a user's event log, evaluates every
//! TraitDefinition against it, and upserts the results. Evaluation errors
//! are swallowed into a `null` value per §4.1's trait failure policy -
//! they never bubble out of `recompute`.

use std::collections::BTreeMap;
use std::sync::Arc;

use cdp_dsl::{eval, parse, Binding, Env};
use cdp_types::{EventMetric, Timestamp, UserId, Value};
use tracing::warn;

use crate::error::Result;
use crate::ports::{EventStore, TraitDefStore, UserTraitStore};
use crate::types::UserTrait;

/// The trait dialect's environment: `events.<name>.<metric>`, `profile`,
/// `first_seen_days_ago`, `last_seen_minutes_ago` (§4.1 Dialect bindings).
pub struct TraitContext {
    events: BTreeMap<String, EventMetric>,
    first_seen_days_ago: i64,
    last_seen_minutes_ago: i64,
}

fn metric_binding(m: &EventMetric) -> Binding {
    Binding::object([
        ("count_7d".to_string(), Binding::Value(Value::Number(m.count_7d as f64))),
        ("count_14d".to_string(), Binding::Value(Value::Number(m.count_14d as f64))),
        ("count_30d".to_string(), Binding::Value(Value::Number(m.count_30d as f64))),
        (
            "unique_days_7d".to_string(),
            Binding::Value(Value::Number(m.unique_days_7d as f64)),
        ),
        (
            "unique_days_14d".to_string(),
            Binding::Value(Value::Number(m.unique_days_14d as f64)),
        ),
        (
            "unique_days_30d".to_string(),
            Binding::Value(Value::Number(m.unique_days_30d as f64)),
        ),
        (
            "first_seen_days_ago".to_string(),
            Binding::Value(Value::Number(m.first_seen_days_ago as f64)),
        ),
        (
            "last_seen_days_ago".to_string(),
            Binding::Value(Value::Number(m.last_seen_days_ago as f64)),
        ),
    ])
}

impl Env for TraitContext {
    fn root(&self, name: &str) -> Binding {
        match name {
            "events" => Binding::object(
                self.events.iter().map(|(k, m)| (k.clone(), metric_binding(m))),
            ),
            // Reserved: the identify path does not yet persist profile
            // traits (§4.4, §9 Open Question 2). Always empty.
            "profile" => Binding::object(std::iter::empty()),
            "first_seen_days_ago" => {
                Binding::Value(Value::Number(self.first_seen_days_ago as f64))
            }
            "last_seen_minutes_ago" => {
                Binding::Value(Value::Number(self.last_seen_minutes_ago as f64))
            }
            _ => Binding::Missing,
        }
    }
}

/// Floor division of elapsed milliseconds into whole days.
pub fn days_ago(now: Timestamp, then: Timestamp) -> i64 {
    (now - then).num_milliseconds().div_euclid(86_400_000)
}

/// Floor division of elapsed milliseconds into whole minutes.
pub fn minutes_ago(now: Timestamp, then: Timestamp) -> i64 {
    (now - then).num_milliseconds().div_euclid(60_000)
}

pub async fn build_context(
    event_store: &Arc<dyn EventStore>,
    user_id: UserId,
    now: Timestamp,
) -> Result<TraitContext> {
    let events = event_store.event_metrics(user_id, now).await?;
    let span = event_store.user_span(user_id).await?;
    let (first_seen_days_ago, last_seen_minutes_ago) = match span {
        Some((first, last)) => (days_ago(now, first), minutes_ago(now, last)),
        None => (-1, -1),
    };
    Ok(TraitContext {
        events,
        first_seen_days_ago,
        last_seen_minutes_ago,
    })
}

/// Recompute every TraitDefinition for `user_id`, in key order, and
/// persist the results in one transaction (§4.4). Evaluation or parse
/// errors become `null`, not a propagated failure.
pub async fn recompute(
    event_store: &Arc<dyn EventStore>,
    trait_defs: &Arc<dyn TraitDefStore>,
    user_traits: &Arc<dyn UserTraitStore>,
    user_id: UserId,
    now: Timestamp,
) -> Result<Vec<UserTrait>> {
    let mut defs = trait_defs.list().await?;
    defs.sort_by(|a, b| a.key.cmp(&b.key));

    let ctx = build_context(event_store, user_id, now).await?;

    let mut values = Vec::with_capacity(defs.len());
    for def in &defs {
        let value = match parse(&def.expression) {
            Ok(parsed) => match eval(&parsed.expr, &ctx) {
                Ok(v) => v,
                Err(e) => {
                    warn!(key = %def.key, error = %e, "trait evaluation failed, writing null");
                    Value::Null
                }
            },
            Err(e) => {
                warn!(key = %def.key, error = %e, "trait expression failed to parse, writing null");
                Value::Null
            }
        };
        values.push((def.key.clone(), value));
    }

    user_traits.upsert_all(user_id, values, now).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{InMemoryEventStore, InMemoryTraitDefStore, InMemoryUserTraitStore};
    use crate::types::NewEvent;
    use chrono::Duration;

    #[tokio::test]
    async fn scenario_a_power_user_trait_true() {
        let events = Arc::new(InMemoryEventStore::default());
        let defs = Arc::new(InMemoryTraitDefStore::default());
        let user_traits: Arc<dyn UserTraitStore> = Arc::new(InMemoryUserTraitStore::default());

        let user_id = uuid::Uuid::new_v4();
        let now = chrono::Utc::now();

        for day in 0..5 {
            events.push(NewEvent {
                user_id,
                ts: now - Duration::days(day),
                name: "app_open".to_string(),
                props: None,
            });
        }

        defs.set("power_user", "events.app_open.unique_days_14d >= 5", now);

        let events: Arc<dyn EventStore> = events;
        let defs: Arc<dyn TraitDefStore> = defs;
        let rows = recompute(&events, &defs, &user_traits, user_id, now).await.unwrap();
        let power_user = rows.iter().find(|r| r.key == "power_user").unwrap();
        assert_eq!(power_user.value, Value::Bool(true));
    }

    #[tokio::test]
    async fn scenario_f_evaluation_error_writes_null() {
        let events = Arc::new(InMemoryEventStore::default());
        let defs = Arc::new(InMemoryTraitDefStore::default());
        let user_traits: Arc<dyn UserTraitStore> = Arc::new(InMemoryUserTraitStore::default());

        defs.set("bad", "1 in 2", chrono::Utc::now());

        let user_id = uuid::Uuid::new_v4();
        let now = chrono::Utc::now();
        let events: Arc<dyn EventStore> = events;
        let defs: Arc<dyn TraitDefStore> = defs;
        let rows = recompute(&events, &defs, &user_traits, user_id, now).await.unwrap();
        assert_eq!(rows.iter().find(|r| r.key == "bad").unwrap().value, Value::Null);
    }

    #[tokio::test]
    async fn missing_event_name_is_null_not_zero() {
        let events = Arc::new(InMemoryEventStore::default());
        let defs = Arc::new(InMemoryTraitDefStore::default());
        let user_traits: Arc<dyn UserTraitStore> = Arc::new(InMemoryUserTraitStore::default());

        defs.set("never", "events.never_seen.count_7d", chrono::Utc::now());

        let user_id = uuid::Uuid::new_v4();
        let now = chrono::Utc::now();
        let events: Arc<dyn EventStore> = events;
        let defs: Arc<dyn TraitDefStore> = defs;
        let rows = recompute(&events, &defs, &user_traits, user_id, now).await.unwrap();
        assert_eq!(rows.iter().find(|r| r.key == "never").unwrap().value, Value::Null);
    }

    #[tokio::test]
    async fn recompute_is_idempotent_value_json() {
        let events = Arc::new(InMemoryEventStore::default());
        let defs = Arc::new(InMemoryTraitDefStore::default());
        let user_traits: Arc<dyn UserTraitStore> = Arc::new(InMemoryUserTraitStore::default());

        defs.set("k", "1 == 1", chrono::Utc::now());

        let user_id = uuid::Uuid::new_v4();
        let now = chrono::Utc::now();
        let events: Arc<dyn EventStore> = events;
        let defs: Arc<dyn TraitDefStore> = defs;
        let first = recompute(&events, &defs, &user_traits, user_id, now).await.unwrap();
        let second = recompute(&events, &defs, &user_traits, user_id, now).await.unwrap();
        assert_eq!(first[0].value, second[0].value);
    }
}
