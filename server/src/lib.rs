//! cdp-server — standalone REST server for the customer data platform.
//!
//! Routes (§6):
//!   GET  /health                      — liveness, no auth
//!   POST /v1/identify                 — write
//!   POST /v1/track                    — write
//!   GET  /v1/decide                   — read
//!   *    /v1/admin/traits[/:key]      — read (list), admin (write)
//!   *    /v1/admin/segments[/:key]    — read (list), admin (write)
//!   *    /v1/admin/flags[/:key]       — read (list), admin (write)
//!   POST /v1/admin/validate           — read
//!   GET  /v1/admin/users/search       — read
//!   GET  /v1/admin/users/:id          — read
//!   GET  /v1/admin/metrics            — read
//!   GET  /v1/export/segment/:key      — read

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;
