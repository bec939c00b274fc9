//! Router construction (§6). Three auth tiers mirror the `read ⊂ write ⊂
//! admin` hierarchy of `cdp_core::principal`, each its own route group
//! layered with the matching `auth::require_*` middleware — same
//! `Router::merge` + `middleware::from_fn` + `Extension` shape as the
//! teacher's `build_router`, generalized from one protected/public split
//! to three tiers.

use std::sync::Arc;

use axum::{
    middleware as axum_mw,
    routing::{delete, get, post, put},
    Extension, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth;
use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let public = Router::new().route("/health", get(handlers::health::health));

    let read_routes = Router::new()
        .route("/v1/decide", get(handlers::decide::decide))
        .route("/v1/admin/traits", get(handlers::admin_traits::list))
        .route("/v1/admin/segments", get(handlers::admin_segments::list))
        .route("/v1/admin/flags", get(handlers::admin_flags::list))
        .route("/v1/admin/validate", post(handlers::admin_validate::admin_validate))
        .route("/v1/admin/users/search", get(handlers::admin_users::search))
        .route("/v1/admin/users/:id", get(handlers::admin_users::get))
        .route("/v1/admin/metrics", get(handlers::admin_metrics::metrics))
        .route("/v1/export/segment/:key", get(handlers::export::export_segment))
        .layer(axum_mw::from_fn(auth::require_read));

    let write_routes = Router::new()
        .route("/v1/identify", post(handlers::identify::identify))
        .route("/v1/track", post(handlers::track::track))
        .layer(axum_mw::from_fn(auth::require_write));

    let admin_routes = Router::new()
        .route("/v1/admin/traits", post(handlers::admin_traits::create))
        .route("/v1/admin/traits/:key", put(handlers::admin_traits::update))
        .route("/v1/admin/traits/:key", delete(handlers::admin_traits::delete))
        .route("/v1/admin/segments", post(handlers::admin_segments::create))
        .route("/v1/admin/segments/:key", put(handlers::admin_segments::update))
        .route("/v1/admin/segments/:key", delete(handlers::admin_segments::delete))
        .route("/v1/admin/flags", post(handlers::admin_flags::create))
        .route("/v1/admin/flags/:key", put(handlers::admin_flags::update))
        .route("/v1/admin/flags/:key", delete(handlers::admin_flags::delete))
        .layer(axum_mw::from_fn(auth::require_admin));

    public
        .merge(read_routes)
        .merge(write_routes)
        .merge(admin_routes)
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
