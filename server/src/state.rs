//! Shared application state, built once in `main.rs` from a `PgPool` and
//! injected into every handler via `Extension<Arc<AppState>>`. The teacher
//! wires one `Arc<dyn CoreService>` extension per request; this crate has
//! a wider port surface (seven stores plus the cache and lock table), so
//! they are bundled into a single state struct rather than one extension
//! per port.

use std::sync::Arc;

use cdp_core::cache::DecisionCache;
use cdp_core::lock_table::LockTable;
use cdp_core::pipeline::Pipeline;
use cdp_core::ports::{AdminQueryStore, FlagDefStore, SegmentDefStore, TraitDefStore, UserSegmentStore, UserTraitStore};
use cdp_postgres::PgStores;
use sqlx::PgPool;

pub struct AppState {
    pub pool: PgPool,
    pub pipeline: Pipeline,
    pub decision_cache: Arc<DecisionCache>,
    pub trait_defs: Arc<dyn TraitDefStore>,
    pub segment_defs: Arc<dyn SegmentDefStore>,
    pub flag_defs: Arc<dyn FlagDefStore>,
    pub user_traits: Arc<dyn UserTraitStore>,
    pub user_segments: Arc<dyn UserSegmentStore>,
    pub admin: Arc<dyn AdminQueryStore>,
}

impl AppState {
    pub fn new(pool: PgPool, decision_cache_ttl: std::time::Duration) -> Self {
        let stores = PgStores::new(pool.clone());

        let identity = Arc::new(stores.identity);
        let events = Arc::new(stores.events);
        let trait_defs: Arc<dyn TraitDefStore> = Arc::new(stores.trait_defs);
        let segment_defs: Arc<dyn SegmentDefStore> = Arc::new(stores.segment_defs);
        let flag_defs: Arc<dyn FlagDefStore> = Arc::new(stores.flag_defs);
        let user_traits: Arc<dyn UserTraitStore> = Arc::new(stores.user_traits);
        let user_segments: Arc<dyn UserSegmentStore> = Arc::new(stores.user_segments);
        let admin: Arc<dyn AdminQueryStore> = Arc::new(stores.admin);

        let decision_cache = Arc::new(DecisionCache::new(decision_cache_ttl));

        let pipeline = Pipeline {
            identity_store: identity,
            event_store: events,
            trait_defs: trait_defs.clone(),
            segment_defs: segment_defs.clone(),
            user_traits: user_traits.clone(),
            user_segments: user_segments.clone(),
            decision_cache: decision_cache.clone(),
            locks: Arc::new(LockTable::new()),
        };

        Self {
            pool,
            pipeline,
            decision_cache,
            trait_defs,
            segment_defs,
            flag_defs,
            user_traits,
            user_segments,
            admin,
        }
    }
}
