//! Environment-variable configuration, loaded via `dotenvy` before anything
//! else runs: a handful of `std::env::var` reads up front, no config file
//! format.

use std::time::Duration;

pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub decision_cache_ttl: Duration,
}

impl Config {
    /// Reads `DATABASE_URL` (required), `BIND_ADDR` (default
    /// `0.0.0.0:4100`), and `DECISION_CACHE_TTL_SECONDS` (default 60,
    /// matching §4.6's TTL; the sweeper interval is derived from this by
    /// `cdp_core::cache::spawn_sweeper`, not configured separately).
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:4100".into());

        let ttl_secs: u64 = std::env::var("DECISION_CACHE_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        Self {
            database_url,
            bind_addr,
            decision_cache_ttl: Duration::from_secs(ttl_secs),
        }
    }
}
