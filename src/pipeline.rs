//! Pipeline Orchestrator (§4.7).
//!
//! `track` runs resolve -> persist event -> recompute traits -> recompute
//! segments -> invalidate cache, strictly in that order within a request
//! (§5 "Suspension points"); per-user serialization is provided by
//! [`crate::lock_table::LockTable`], not by this module. A trait or
//! segment recomputation failure is logged and does not fail the call -
//! the event is already durable by the time those steps run.

use std::sync::Arc;

use cdp_types::{Timestamp, UserId};
use tracing::warn;

use crate::cache::DecisionCache;
use crate::error::{CdpError, Result};
use crate::identity;
use crate::lock_table::LockTable;
use crate::ports::{
    EventStore, IdentityStore, SegmentDefStore, TraitDefStore, UserSegmentStore, UserTraitStore,
};
use crate::segments;
use crate::traits;
use crate::types::{AliasSet, Event, NewEvent};

pub struct Pipeline {
    pub identity_store: Arc<dyn IdentityStore>,
    pub event_store: Arc<dyn EventStore>,
    pub trait_defs: Arc<dyn TraitDefStore>,
    pub segment_defs: Arc<dyn SegmentDefStore>,
    pub user_traits: Arc<dyn UserTraitStore>,
    pub user_segments: Arc<dyn UserSegmentStore>,
    pub decision_cache: Arc<DecisionCache>,
    pub locks: Arc<LockTable>,
}

pub struct TrackInput {
    pub aliases: AliasSet,
    pub name: String,
    /// `None` defaults to `now` (§4.7 step 1).
    pub ts: Option<Timestamp>,
    pub props: Option<cdp_types::Props>,
}

pub struct TrackOutcome {
    pub user_id: UserId,
    pub created: bool,
    pub event: Event,
}

pub struct IdentifyOutcome {
    pub user_id: UserId,
    pub created: bool,
}

fn validate_event_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CdpError::InvalidInput("event name must not be empty".into()));
    }
    Ok(())
}

impl Pipeline {
    pub async fn track(&self, input: TrackInput, now: Timestamp) -> Result<TrackOutcome> {
        validate_event_name(&input.name)?;
        if input.aliases.is_empty() {
            return Err(CdpError::InvalidInput(
                "at least one of deviceId, externalId, emailHash is required".into(),
            ));
        }
        let ts = input.ts.unwrap_or(now);

        let resolved = identity::resolve(&self.identity_store, &input.aliases, now).await?;
        let _guard = self.locks.lock(resolved.user_id).await;

        let event = self
            .event_store
            .append(NewEvent {
                user_id: resolved.user_id,
                ts,
                name: input.name,
                props: input.props,
            })
            .await?;

        if let Err(e) = self.recompute_derived_state(resolved.user_id, now).await {
            warn!(
                user_id = %resolved.user_id,
                error = %e,
                "derived-state recomputation failed after track; event is durable, traits/segments are stale until the next event"
            );
        }

        drop(_guard);
        self.locks.sweep_unreferenced();

        Ok(TrackOutcome {
            user_id: resolved.user_id,
            created: resolved.created,
            event,
        })
    }

    /// Step 4-6: trait recompute -> segment recompute -> cache
    /// invalidation, each gated on the previous step's success (§4.7).
    async fn recompute_derived_state(&self, user_id: UserId, now: Timestamp) -> Result<()> {
        traits::recompute(&self.event_store, &self.trait_defs, &self.user_traits, user_id, now)
            .await?;
        segments::recompute(
            &self.segment_defs,
            &self.user_traits,
            &self.user_segments,
            user_id,
            now,
        )
        .await?;
        self.decision_cache.invalidate_user(user_id);
        Ok(())
    }

    /// Steps 1-2 only (§4.7 "On identify"): any traits supplied in the
    /// request are accepted at the API boundary but not persisted here -
    /// §9 leaves the profile map unimplemented.
    pub async fn identify(&self, aliases: AliasSet, now: Timestamp) -> Result<IdentifyOutcome> {
        if aliases.is_empty() {
            return Err(CdpError::InvalidInput(
                "at least one of deviceId, externalId, emailHash is required".into(),
            ));
        }
        let resolved = identity::resolve(&self.identity_store, &aliases, now).await?;
        Ok(IdentifyOutcome {
            user_id: resolved.user_id,
            created: resolved.created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        InMemoryEventStore, InMemoryIdentityStore, InMemorySegmentDefStore, InMemoryTraitDefStore,
        InMemoryUserSegmentStore, InMemoryUserTraitStore,
    };
    use cdp_types::Value;

    fn pipeline() -> Pipeline {
        Pipeline {
            identity_store: Arc::new(InMemoryIdentityStore::default()),
            event_store: Arc::new(InMemoryEventStore::default()),
            trait_defs: Arc::new(InMemoryTraitDefStore::default()),
            segment_defs: Arc::new(InMemorySegmentDefStore::default()),
            user_traits: Arc::new(InMemoryUserTraitStore::default()),
            user_segments: Arc::new(InMemoryUserSegmentStore::default()),
            decision_cache: Arc::new(DecisionCache::default()),
            locks: Arc::new(LockTable::new()),
        }
    }

    fn device_aliases(value: &str) -> AliasSet {
        AliasSet {
            device_id: Some(value.to_string()),
            external_id: None,
            email_hash: None,
        }
    }

    #[tokio::test]
    async fn track_rejects_empty_event_name() {
        let p = pipeline();
        let now = chrono::Utc::now();
        let err = p
            .track(
                TrackInput {
                    aliases: device_aliases("D1"),
                    name: "".to_string(),
                    ts: None,
                    props: None,
                },
                now,
            )
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[tokio::test]
    async fn track_rejects_no_identifiers() {
        let p = pipeline();
        let now = chrono::Utc::now();
        let err = p
            .track(
                TrackInput {
                    aliases: AliasSet::default(),
                    name: "app_open".to_string(),
                    ts: None,
                    props: None,
                },
                now,
            )
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[tokio::test]
    async fn track_defaults_timestamp_to_now_and_persists_event() {
        let p = pipeline();
        let now = chrono::Utc::now();
        let outcome = p
            .track(
                TrackInput {
                    aliases: device_aliases("D1"),
                    name: "app_open".to_string(),
                    ts: None,
                    props: None,
                },
                now,
            )
            .await
            .unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.event.ts, now);
        assert_eq!(outcome.event.name, "app_open");
    }

    #[tokio::test]
    async fn track_recomputes_traits_and_segments_and_invalidates_cache() {
        let p = pipeline();
        let now = chrono::Utc::now();

        let trait_defs = Arc::new(InMemoryTraitDefStore::default());
        trait_defs.set("power_user", "events.app_open.count_7d >= 1", now);
        let segment_defs = Arc::new(InMemorySegmentDefStore::default());
        segment_defs.set("power_users", "power_user", now);

        let p = Pipeline {
            trait_defs,
            segment_defs,
            ..p
        };

        let outcome = p
            .track(
                TrackInput {
                    aliases: device_aliases("D1"),
                    name: "app_open".to_string(),
                    ts: None,
                    props: None,
                },
                now,
            )
            .await
            .unwrap();

        let user_traits = p.user_traits.get_all(outcome.user_id).await.unwrap();
        assert_eq!(user_traits.get("power_user").unwrap().value, Value::Bool(true));

        let user_segments = p.user_segments.get_all(outcome.user_id).await.unwrap();
        assert!(user_segments.get("power_users").unwrap().in_segment);
    }

    #[tokio::test]
    async fn identify_does_not_persist_an_event() {
        let p = pipeline();
        let now = chrono::Utc::now();
        let out = p.identify(device_aliases("D1"), now).await.unwrap();
        assert!(out.created);
    }
}
