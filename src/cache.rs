//! Decision Engine cache (§4.6).
//!
//! A bounded in-process map keyed by `(userId, flagKey)`, backed by
//! `DashMap` for lock-free concurrent access. Two auxiliary
//! `DashMap<K, DashSet<V>>` indices - user -> flags and flag -> users -
//! give O(affected) targeted invalidation instead of a full scan.

use std::time::Duration;

use cdp_types::UserId;
use dashmap::{DashMap, DashSet};

/// Default cache entry lifetime (§4.6: "TTL = 60 seconds").
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub allow: bool,
    /// Reserved for future rule grammar; the current grammar only ever
    /// produces `allow`, so this is always `None` (§4.6 "Variant").
    pub variant: Option<String>,
    pub reasons: Vec<String>,
    pub expires_at: tokio::time::Instant,
}

pub struct DecisionCache {
    entries: DashMap<(UserId, String), CacheEntry>,
    by_user: DashMap<UserId, DashSet<String>>,
    by_flag: DashMap<String, DashSet<UserId>>,
    ttl: Duration,
}

impl DecisionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            by_user: DashMap::new(),
            by_flag: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a live (non-expired) entry, if any. An expired entry is
    /// never returned - the sweeper is only a memory optimisation, not a
    /// correctness mechanism (§4.6 Cache).
    pub fn get(&self, user_id: UserId, flag_key: &str) -> Option<CacheEntry> {
        let key = (user_id, flag_key.to_string());
        match self.entries.get(&key) {
            Some(entry) if entry.expires_at > tokio::time::Instant::now() => Some(entry.clone()),
            _ => None,
        }
    }

    pub fn put(&self, user_id: UserId, flag_key: &str, entry: CacheEntry) {
        self.by_user
            .entry(user_id)
            .or_default()
            .insert(flag_key.to_string());
        self.by_flag
            .entry(flag_key.to_string())
            .or_default()
            .insert(user_id);
        self.entries.insert((user_id, flag_key.to_string()), entry);
    }

    /// Clear one (user, flag) entry.
    pub fn invalidate_one(&self, user_id: UserId, flag_key: &str) {
        self.entries.remove(&(user_id, flag_key.to_string()));
        if let Some(flags) = self.by_user.get(&user_id) {
            flags.remove(flag_key);
        }
        if let Some(users) = self.by_flag.get(flag_key) {
            users.remove(&user_id);
        }
    }

    /// Clear all entries for a user (§4.7 step 6: invalidate after
    /// segment recomputation).
    pub fn invalidate_user(&self, user_id: UserId) {
        if let Some((_, flags)) = self.by_user.remove(&user_id) {
            for flag_key in flags.iter() {
                self.entries.remove(&(user_id, flag_key.clone()));
                if let Some(users) = self.by_flag.get(flag_key.as_str()) {
                    users.remove(&user_id);
                }
            }
        }
    }

    /// Clear all entries for a flag.
    pub fn invalidate_flag(&self, flag_key: &str) {
        if let Some((_, users)) = self.by_flag.remove(flag_key) {
            for user_id in users.iter() {
                self.entries.remove(&(*user_id, flag_key.to_string()));
                if let Some(flags) = self.by_user.get(user_id) {
                    flags.remove(flag_key);
                }
            }
        }
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.entries.clear();
        self.by_user.clear();
        self.by_flag.clear();
    }

    /// Drop every expired entry. Run on a fixed interval (≤ TTL/2) by
    /// [`spawn_sweeper`]; never required for correctness.
    pub fn sweep_expired(&self) {
        let now = tokio::time::Instant::now();
        let expired: Vec<(UserId, String)> = self
            .entries
            .iter()
            .filter(|entry| entry.expires_at <= now)
            .map(|entry| entry.key().clone())
            .collect();
        for (user_id, flag_key) in expired {
            self.invalidate_one(user_id, &flag_key);
        }
    }
}

impl Default for DecisionCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

/// Spawn a background sweeper at half the cache's TTL (capped below the
/// TTL per §4.6: "at a fixed interval (≤ TTL/2)").
pub fn spawn_sweeper(cache: std::sync::Arc<DecisionCache>) -> tokio::task::JoinHandle<()> {
    let interval = cache.ttl() / 2;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            cache.sweep_expired();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(allow: bool, ttl: Duration) -> CacheEntry {
        CacheEntry {
            allow,
            variant: None,
            reasons: vec![],
            expires_at: tokio::time::Instant::now() + ttl,
        }
    }

    #[tokio::test]
    async fn get_returns_none_before_any_put() {
        let cache = DecisionCache::default();
        assert!(cache.get(uuid::Uuid::new_v4(), "beta").is_none());
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = DecisionCache::default();
        let user_id = uuid::Uuid::new_v4();
        cache.put(user_id, "beta", entry(true, Duration::from_secs(60)));
        let hit = cache.get(user_id, "beta").unwrap();
        assert!(hit.allow);
    }

    #[tokio::test]
    async fn expired_entry_is_not_returned() {
        tokio::time::pause();
        let cache = DecisionCache::default();
        let user_id = uuid::Uuid::new_v4();
        cache.put(user_id, "beta", entry(true, Duration::from_millis(10)));
        tokio::time::advance(Duration::from_millis(20)).await;
        assert!(cache.get(user_id, "beta").is_none());
    }

    #[tokio::test]
    async fn invalidate_one_removes_only_that_pair() {
        let cache = DecisionCache::default();
        let user_id = uuid::Uuid::new_v4();
        cache.put(user_id, "beta", entry(true, Duration::from_secs(60)));
        cache.put(user_id, "gamma", entry(false, Duration::from_secs(60)));
        cache.invalidate_one(user_id, "beta");
        assert!(cache.get(user_id, "beta").is_none());
        assert!(cache.get(user_id, "gamma").is_some());
    }

    #[tokio::test]
    async fn invalidate_user_clears_all_flags_for_that_user_only() {
        let cache = DecisionCache::default();
        let u1 = uuid::Uuid::new_v4();
        let u2 = uuid::Uuid::new_v4();
        cache.put(u1, "beta", entry(true, Duration::from_secs(60)));
        cache.put(u1, "gamma", entry(true, Duration::from_secs(60)));
        cache.put(u2, "beta", entry(true, Duration::from_secs(60)));
        cache.invalidate_user(u1);
        assert!(cache.get(u1, "beta").is_none());
        assert!(cache.get(u1, "gamma").is_none());
        assert!(cache.get(u2, "beta").is_some());
    }

    #[tokio::test]
    async fn invalidate_flag_clears_all_users_for_that_flag_only() {
        let cache = DecisionCache::default();
        let u1 = uuid::Uuid::new_v4();
        let u2 = uuid::Uuid::new_v4();
        cache.put(u1, "beta", entry(true, Duration::from_secs(60)));
        cache.put(u2, "beta", entry(true, Duration::from_secs(60)));
        cache.put(u1, "gamma", entry(true, Duration::from_secs(60)));
        cache.invalidate_flag("beta");
        assert!(cache.get(u1, "beta").is_none());
        assert!(cache.get(u2, "beta").is_none());
        assert!(cache.get(u1, "gamma").is_some());
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let cache = DecisionCache::default();
        let user_id = uuid::Uuid::new_v4();
        cache.put(user_id, "beta", entry(true, Duration::from_secs(60)));
        cache.clear();
        assert!(cache.get(user_id, "beta").is_none());
    }

    #[tokio::test]
    async fn sweep_expired_only_drops_expired_entries() {
        tokio::time::pause();
        let cache = DecisionCache::default();
        let user_id = uuid::Uuid::new_v4();
        cache.put(user_id, "short", entry(true, Duration::from_millis(10)));
        cache.put(user_id, "long", entry(true, Duration::from_secs(60)));
        tokio::time::advance(Duration::from_millis(20)).await;
        cache.sweep_expired();
        assert_eq!(cache.entries.len(), 1);
        assert!(cache.get(user_id, "short").is_none());
        assert!(cache.get(user_id, "long").is_some());
    }
}
