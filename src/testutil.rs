//! In-memory fakes for the port traits in [`crate::ports`], used by unit
//! tests throughout this crate. `cdp-postgres` is the real adapter; these
//! fakes exist so the derivation and decision logic can be exercised
//! without a database (§9 "Test tooling").

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use cdp_types::{EventMetric, Timestamp, UserId, Value};

use crate::error::Result;
use crate::ports::{
    AliasLinkOutcome, EventStore, FlagDefStore, IdentityStore, SegmentDefStore, TraitDefStore,
    UserSegmentStore, UserTraitStore,
};
use crate::types::{
    AliasKind, Event, FlagDefinition, NewEvent, SegmentDefinition, TraitDefinition, UserSegment,
    UserTrait,
};

#[derive(Default)]
struct IdentityState {
    aliases: BTreeMap<(AliasKind, String), UserId>,
}

#[derive(Default)]
pub struct InMemoryIdentityStore {
    state: Mutex<IdentityState>,
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn find_user_by_alias(&self, kind: AliasKind, value: &str) -> Result<Option<UserId>> {
        let state = self.state.lock().unwrap();
        Ok(state.aliases.get(&(kind, value.to_string())).copied())
    }

    async fn create_user(&self, _now: Timestamp) -> Result<UserId> {
        Ok(UserId::new_v4())
    }

    async fn link_alias(
        &self,
        kind: AliasKind,
        value: &str,
        user_id: UserId,
    ) -> Result<AliasLinkOutcome> {
        let mut state = self.state.lock().unwrap();
        match state.aliases.get(&(kind, value.to_string())) {
            Some(existing) if *existing == user_id => Ok(AliasLinkOutcome::AlreadyLinkedToThisUser),
            Some(existing) => Ok(AliasLinkOutcome::ConflictWithOtherUser(*existing)),
            None => {
                state.aliases.insert((kind, value.to_string()), user_id);
                Ok(AliasLinkOutcome::Linked)
            }
        }
    }
}

#[derive(Default)]
pub struct InMemoryEventStore {
    events: Mutex<Vec<Event>>,
    next_id: Mutex<i64>,
}

impl InMemoryEventStore {
    /// Synchronous convenience for seeding events in tests.
    pub fn push(&self, event: NewEvent) -> Event {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let row = Event {
            id: *next_id,
            user_id: event.user_id,
            ts: event.ts,
            name: event.name,
            props: event.props,
        };
        self.events.lock().unwrap().push(row.clone());
        row
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: NewEvent) -> Result<Event> {
        Ok(self.push(event))
    }

    async fn event_metrics(
        &self,
        user_id: UserId,
        now: Timestamp,
    ) -> Result<BTreeMap<String, EventMetric>> {
        let mut by_name: BTreeMap<String, Vec<Timestamp>> = BTreeMap::new();
        for e in self.events.lock().unwrap().iter().filter(|e| e.user_id == user_id) {
            by_name.entry(e.name.clone()).or_default().push(e.ts);
        }

        let mut out = BTreeMap::new();
        for (name, mut timestamps) in by_name {
            timestamps.sort();

            let count_within = |days: i64| {
                timestamps
                    .iter()
                    .filter(|ts| {
                        let age = now.signed_duration_since(**ts);
                        age >= chrono::Duration::zero() && age <= chrono::Duration::days(days)
                    })
                    .count() as i64
            };
            let unique_days_within = |days: i64| {
                timestamps
                    .iter()
                    .filter(|ts| {
                        let age = now.signed_duration_since(**ts);
                        age >= chrono::Duration::zero() && age <= chrono::Duration::days(days)
                    })
                    .map(|ts| ts.date_naive())
                    .collect::<std::collections::BTreeSet<_>>()
                    .len() as i64
            };

            let first = *timestamps.first().expect("non-empty by construction");
            let last = *timestamps.last().expect("non-empty by construction");

            out.insert(
                name,
                EventMetric {
                    count_7d: count_within(7),
                    count_14d: count_within(14),
                    count_30d: count_within(30),
                    unique_days_7d: unique_days_within(7),
                    unique_days_14d: unique_days_within(14),
                    unique_days_30d: unique_days_within(30),
                    first_seen_days_ago: crate::traits::days_ago(now, first),
                    last_seen_days_ago: crate::traits::days_ago(now, last),
                },
            );
        }
        Ok(out)
    }

    async fn user_span(&self, user_id: UserId) -> Result<Option<(Timestamp, Timestamp)>> {
        let mut span: Option<(Timestamp, Timestamp)> = None;
        for e in self.events.lock().unwrap().iter().filter(|e| e.user_id == user_id) {
            span = Some(match span {
                None => (e.ts, e.ts),
                Some((first, last)) => (first.min(e.ts), last.max(e.ts)),
            });
        }
        Ok(span)
    }
}

#[derive(Default)]
pub struct InMemoryTraitDefStore {
    defs: Mutex<BTreeMap<String, TraitDefinition>>,
}

impl InMemoryTraitDefStore {
    /// Synchronous convenience for seeding definitions in tests.
    pub fn set(&self, key: &str, expression: &str, now: Timestamp) {
        self.defs.lock().unwrap().insert(
            key.to_string(),
            TraitDefinition {
                key: key.to_string(),
                expression: expression.to_string(),
                updated_at: now,
            },
        );
    }
}

#[async_trait]
impl TraitDefStore for InMemoryTraitDefStore {
    async fn list(&self) -> Result<Vec<TraitDefinition>> {
        Ok(self.defs.lock().unwrap().values().cloned().collect())
    }

    async fn get(&self, key: &str) -> Result<Option<TraitDefinition>> {
        Ok(self.defs.lock().unwrap().get(key).cloned())
    }

    async fn upsert(&self, key: &str, expression: &str, now: Timestamp) -> Result<TraitDefinition> {
        self.set(key, expression, now);
        Ok(self.defs.lock().unwrap().get(key).cloned().expect("just inserted"))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.defs.lock().unwrap().remove(key).is_some())
    }
}

#[derive(Default)]
pub struct InMemorySegmentDefStore {
    defs: Mutex<BTreeMap<String, SegmentDefinition>>,
}

impl InMemorySegmentDefStore {
    pub fn set(&self, key: &str, rule: &str, now: Timestamp) {
        self.defs.lock().unwrap().insert(
            key.to_string(),
            SegmentDefinition {
                key: key.to_string(),
                rule: rule.to_string(),
                updated_at: now,
            },
        );
    }
}

#[async_trait]
impl SegmentDefStore for InMemorySegmentDefStore {
    async fn list(&self) -> Result<Vec<SegmentDefinition>> {
        Ok(self.defs.lock().unwrap().values().cloned().collect())
    }

    async fn get(&self, key: &str) -> Result<Option<SegmentDefinition>> {
        Ok(self.defs.lock().unwrap().get(key).cloned())
    }

    async fn upsert(&self, key: &str, rule: &str, now: Timestamp) -> Result<SegmentDefinition> {
        self.set(key, rule, now);
        Ok(self.defs.lock().unwrap().get(key).cloned().expect("just inserted"))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.defs.lock().unwrap().remove(key).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryFlagDefStore {
    defs: Mutex<BTreeMap<String, FlagDefinition>>,
}

impl InMemoryFlagDefStore {
    pub fn set(&self, key: &str, rule: &str) {
        self.defs.lock().unwrap().insert(
            key.to_string(),
            FlagDefinition {
                key: key.to_string(),
                rule: rule.to_string(),
            },
        );
    }
}

#[async_trait]
impl FlagDefStore for InMemoryFlagDefStore {
    async fn list(&self) -> Result<Vec<FlagDefinition>> {
        Ok(self.defs.lock().unwrap().values().cloned().collect())
    }

    async fn get(&self, key: &str) -> Result<Option<FlagDefinition>> {
        Ok(self.defs.lock().unwrap().get(key).cloned())
    }

    async fn upsert(&self, key: &str, rule: &str) -> Result<FlagDefinition> {
        self.set(key, rule);
        Ok(self.defs.lock().unwrap().get(key).cloned().expect("just inserted"))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.defs.lock().unwrap().remove(key).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryUserTraitStore {
    rows: Mutex<BTreeMap<(UserId, String), UserTrait>>,
}

#[async_trait]
impl UserTraitStore for InMemoryUserTraitStore {
    async fn get_all(&self, user_id: UserId) -> Result<BTreeMap<String, UserTrait>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|((uid, _), _)| *uid == user_id)
            .map(|((_, key), row)| (key.clone(), row.clone()))
            .collect())
    }

    async fn upsert_all(
        &self,
        user_id: UserId,
        values: Vec<(String, Value)>,
        now: Timestamp,
    ) -> Result<Vec<UserTrait>> {
        let mut rows = self.rows.lock().unwrap();
        let mut out = Vec::with_capacity(values.len());
        for (key, value) in values {
            let row = UserTrait {
                user_id,
                key: key.clone(),
                value,
                updated_at: now,
            };
            rows.insert((user_id, key), row.clone());
            out.push(row);
        }
        Ok(out)
    }

    async fn delete_by_key(&self, key: &str) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|(_, k), _| k != key);
        Ok((before - rows.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryUserSegmentStore {
    rows: Mutex<BTreeMap<(UserId, String), UserSegment>>,
}

#[async_trait]
impl UserSegmentStore for InMemoryUserSegmentStore {
    async fn get_all(&self, user_id: UserId) -> Result<BTreeMap<String, UserSegment>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|((uid, _), _)| *uid == user_id)
            .map(|((_, key), row)| (key.clone(), row.clone()))
            .collect())
    }

    async fn upsert_all(&self, user_id: UserId, rows: Vec<UserSegment>) -> Result<()> {
        let mut state = self.rows.lock().unwrap();
        for row in rows {
            state.insert((user_id, row.key.clone()), row);
        }
        Ok(())
    }

    async fn delete_by_key(&self, key: &str) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|(_, k), _| k != key);
        Ok((before - rows.len()) as u64)
    }
}
