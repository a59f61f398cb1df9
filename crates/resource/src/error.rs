//! Resource error types.

use caravan_core::NetworkKey;
use thiserror::Error;

/// Errors from proxy and endpoint management.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The proxy pool is empty even after a full reset.
    #[error("no proxies configured")]
    NoProxiesConfigured,

    /// A network key has no entry in the endpoint directory.
    #[error("unknown network: {0}")]
    UnknownNetwork(NetworkKey),

    /// A network was configured with an empty endpoint list.
    #[error("no endpoints configured for network {0}")]
    NoEndpoints(NetworkKey),

    /// The backing store failed.
    #[error("proxy store: {0}")]
    Store(String),
}

impl ResourceError {
    /// Wrap a backing-store failure.
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }
}
