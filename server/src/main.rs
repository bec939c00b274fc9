//! cdp-server binary entrypoint.
//!
//! Reads config from env vars (via `dotenvy`):
//!   DATABASE_URL                  — Postgres connection string (required)
//!   BIND_ADDR                     — listen address (default 0.0.0.0:4100)
//!   DECISION_CACHE_TTL_SECONDS    — decision cache entry lifetime (default 60)

use std::sync::Arc;

use cdp_core::cache::spawn_sweeper;
use cdp_server::config::Config;
use cdp_server::router::build_router;
use cdp_server::state::AppState;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cdp_server=debug".into()),
        )
        .init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    tracing::info!("connected to database");

    sqlx::migrate!("../crates/cdp-postgres/migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    let state = Arc::new(AppState::new(pool, config.decision_cache_ttl));
    spawn_sweeper(state.decision_cache.clone());

    let app = build_router(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind to {}: {e}", config.bind_addr));
    tracing::info!("cdp-server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("server error");
}
