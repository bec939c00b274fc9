//! cdp-postgres - PostgreSQL implementations of cdp-core's port traits.
//!
//! `sqlx_types` holds the row structs and their `From` conversions into
//! the core domain types, `store` holds the adapters themselves, and
//! `PgStores` is the single entry point the `server` binary uses to wire
//! a `PgPool` to every port at once.

pub mod sqlx_types;
pub mod store;

pub use store::{
    PgAdminQueryStore, PgEventStore, PgFlagDefStore, PgIdentityStore, PgSegmentDefStore,
    PgTraitDefStore, PgUserSegmentStore, PgUserTraitStore,
};

use sqlx::PgPool;

/// Convenience struct that constructs all Postgres adapters from a single pool.
pub struct PgStores {
    pub identity: PgIdentityStore,
    pub events: PgEventStore,
    pub trait_defs: PgTraitDefStore,
    pub segment_defs: PgSegmentDefStore,
    pub flag_defs: PgFlagDefStore,
    pub user_traits: PgUserTraitStore,
    pub user_segments: PgUserSegmentStore,
    pub admin: PgAdminQueryStore,
}

impl PgStores {
    pub fn new(pool: PgPool) -> Self {
        Self {
            identity: PgIdentityStore::new(pool.clone()),
            events: PgEventStore::new(pool.clone()),
            trait_defs: PgTraitDefStore::new(pool.clone()),
            segment_defs: PgSegmentDefStore::new(pool.clone()),
            flag_defs: PgFlagDefStore::new(pool.clone()),
            user_traits: PgUserTraitStore::new(pool.clone()),
            user_segments: PgUserSegmentStore::new(pool.clone()),
            admin: PgAdminQueryStore::new(pool),
        }
    }
}
