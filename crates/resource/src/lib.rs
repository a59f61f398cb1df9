#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Caravan Resource
//!
//! Interchangeable network egress resources for the caravan route engine:
//!
//! - [`ProxyRotator`] — exclusive leases over a pool of egress proxies,
//!   with a reset-on-exhaustion fallback; backed by any [`ProxyStore`]
//! - [`EndpointSet`] — one logical upstream's prioritized endpoint list
//!   with cyclic rotation and per-endpoint failure counters
//! - [`EndpointDirectory`] — the explicit, construction-validated map
//!   from network key to endpoint set

pub mod endpoint;
pub mod error;
pub mod proxy;

pub use endpoint::{Endpoint, EndpointDirectory, EndpointSet};
pub use error::ResourceError;
pub use proxy::{InMemoryProxyStore, ProxyRotator, ProxyStore};
