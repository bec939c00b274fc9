//! Storage port traits, implemented by `cdp-postgres` and by the in-memory
//! fakes in [`crate::testutil`]. Core logic depends only on these traits,
//! never on `sqlx` directly - this crate stays zero-sqlx, `cdp-postgres`
//! is the only crate that knows about a database.

use std::collections::BTreeMap;

use async_trait::async_trait;
use cdp_types::{EventMetric, Timestamp, UserId, Value};

use crate::error::Result;
use crate::types::{
    AdminMetrics, AliasKind, Event, FlagDefinition, NewEvent, SegmentDefinition,
    SegmentExportRow, TraitDefinition, UserDetail, UserSegment, UserSummary, UserTrait,
};

/// Outcome of an alias-link attempt (§4.2 Failure: a uniqueness conflict is
/// not a user-creation failure, it is logged and the alias is left
/// unlinked from the current user).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasLinkOutcome {
    Linked,
    AlreadyLinkedToThisUser,
    ConflictWithOtherUser(UserId),
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_user_by_alias(&self, kind: AliasKind, value: &str) -> Result<Option<UserId>>;

    /// Create a new user row. Races between concurrent first-creators are
    /// resolved by the store (insert-on-conflict-do-nothing plus re-read,
    /// or an equivalent at-most-one-wins strategy) - see §4.2 Concurrency.
    async fn create_user(&self, now: Timestamp) -> Result<UserId>;

    /// Insert-if-absent link of (kind, value) -> user_id, ignoring a
    /// uniqueness conflict rather than failing (§4.2 Failure).
    async fn link_alias(
        &self,
        kind: AliasKind,
        value: &str,
        user_id: UserId,
    ) -> Result<AliasLinkOutcome>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event: NewEvent) -> Result<Event>;

    /// Per-event-name window metrics for every event name this user has
    /// triggered at least once (§4.3/§4.4). A name with no rows never
    /// appears in the returned map - the trait dialect's "missing event
    /// name yields null" relies on that absence, not a zeroed entry.
    async fn event_metrics(
        &self,
        user_id: UserId,
        now: Timestamp,
    ) -> Result<BTreeMap<String, EventMetric>>;

    /// Earliest and latest event timestamp for the user overall, across
    /// all event names (§4.3).
    async fn user_span(&self, user_id: UserId) -> Result<Option<(Timestamp, Timestamp)>>;
}

#[async_trait]
pub trait TraitDefStore: Send + Sync {
    async fn list(&self) -> Result<Vec<TraitDefinition>>;
    async fn get(&self, key: &str) -> Result<Option<TraitDefinition>>;
    async fn upsert(&self, key: &str, expression: &str, now: Timestamp) -> Result<TraitDefinition>;
    /// Returns true if a definition existed and was removed.
    async fn delete(&self, key: &str) -> Result<bool>;
}

#[async_trait]
pub trait SegmentDefStore: Send + Sync {
    async fn list(&self) -> Result<Vec<SegmentDefinition>>;
    async fn get(&self, key: &str) -> Result<Option<SegmentDefinition>>;
    async fn upsert(&self, key: &str, rule: &str, now: Timestamp) -> Result<SegmentDefinition>;
    async fn delete(&self, key: &str) -> Result<bool>;
}

#[async_trait]
pub trait FlagDefStore: Send + Sync {
    async fn list(&self) -> Result<Vec<FlagDefinition>>;
    async fn get(&self, key: &str) -> Result<Option<FlagDefinition>>;
    async fn upsert(&self, key: &str, rule: &str) -> Result<FlagDefinition>;
    async fn delete(&self, key: &str) -> Result<bool>;
}

#[async_trait]
pub trait UserTraitStore: Send + Sync {
    async fn get_all(&self, user_id: UserId) -> Result<BTreeMap<String, UserTrait>>;

    /// Upsert every (key, value) pair for this user in a single
    /// transaction (§4.4 Persistence, §4.4 Ordering guarantee - callers
    /// must serialize concurrent recomputations of the same user
    /// themselves, e.g. via `crate::lock_table`).
    async fn upsert_all(
        &self,
        user_id: UserId,
        values: Vec<(String, Value)>,
        now: Timestamp,
    ) -> Result<Vec<UserTrait>>;

    /// Cascade delete on TraitDefinition removal (§3 Ownership).
    async fn delete_by_key(&self, key: &str) -> Result<u64>;
}

#[async_trait]
pub trait UserSegmentStore: Send + Sync {
    async fn get_all(&self, user_id: UserId) -> Result<BTreeMap<String, UserSegment>>;

    /// Persist already-computed rows (transition timestamps resolved by
    /// `crate::segments`) in a single transaction (§4.5).
    async fn upsert_all(&self, user_id: UserId, rows: Vec<UserSegment>) -> Result<()>;

    async fn delete_by_key(&self, key: &str) -> Result<u64>;
}

/// Read-only admin surface (§6 `/v1/admin/users/search`, `/:id`,
/// `/v1/admin/metrics`, `/v1/export/segment/:key`). None of these affect
/// derivation; they exist purely so the `server` crate has a single port
/// to query instead of hand-rolling SQL against `cdp-core` internals.
#[async_trait]
pub trait AdminQueryStore: Send + Sync {
    /// Substring match against any of a user's aliases; `None` returns
    /// every user. Returns the page plus the total match count (§6
    /// `{users[], total, hasMore}` - `hasMore` is derived by the caller
    /// from `offset + users.len() < total`).
    async fn search_users(
        &self,
        query: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<UserSummary>, i64)>;

    async fn get_user(&self, user_id: UserId) -> Result<Option<UserDetail>>;

    async fn metrics(&self) -> Result<AdminMetrics>;

    /// Members of a segment (`in_segment = true`), in the column order of
    /// the CSV export (§6 CSV export format).
    async fn export_segment_members(&self, key: &str) -> Result<Vec<SegmentExportRow>>;
}
