//! cdp-core: a minimal customer data platform's derivation pipeline and
//! decision path - identity resolution, event persistence, trait and
//! segment computation, and flag decisions - independent of any storage
//! backend. `cdp-postgres` supplies the Postgres-backed implementations
//! of the port traits declared in [`ports`]; the `server` binary wires
//! this crate to `axum`.

pub mod cache;
pub mod decision;
pub mod error;
pub mod identity;
pub mod lock_table;
pub mod pipeline;
pub mod ports;
pub mod principal;
pub mod segments;
pub mod traits;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{CdpError, Result};
