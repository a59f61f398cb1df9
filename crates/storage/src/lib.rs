#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Caravan Storage
//!
//! The persistence gateway for accounts, routes and actions.
//!
//! - [`RouteStore`] — the async store contract the engine consumes;
//!   column-level updates touch `updated_at`, listings eager-load actions
//! - [`MemoryStore`] — always-available in-memory implementation, used
//!   by tests and dry runs
//! - `SqliteStore` — durable sqlite implementation behind the `sqlite`
//!   feature
//!
//! Every store is also a [`caravan_resource::ProxyStore`]: the spare
//! proxy pool lives next to the accounts it serves.

pub mod error;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use store::RouteStore;
