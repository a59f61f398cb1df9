//! Exclusive proxy leases with a reset-on-exhaustion fallback.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::ResourceError;

/// Backing store for the proxy pool.
///
/// The durable implementation lives in `caravan-storage`;
/// [`InMemoryProxyStore`] serves tests and dry runs. Implementations must
/// serialize pool mutation so one free proxy is never leased twice.
#[async_trait]
pub trait ProxyStore: Send + Sync {
    /// Lease the first free proxy, marking it in use. `None` when the
    /// pool is exhausted.
    async fn lease_free(&self) -> Result<Option<String>, ResourceError>;

    /// Release a leased proxy. Must be idempotent; releasing an unknown
    /// or already-free proxy is a no-op.
    async fn release(&self, proxy: &str) -> Result<(), ResourceError>;

    /// Mark every proxy free again.
    async fn reset_all(&self) -> Result<(), ResourceError>;
}

/// An in-memory [`ProxyStore`].
#[derive(Debug, Default)]
pub struct InMemoryProxyStore {
    pool: Mutex<Vec<Lease>>,
}

#[derive(Debug)]
struct Lease {
    endpoint: String,
    in_use: bool,
}

impl InMemoryProxyStore {
    /// Build a pool from proxy endpoint strings.
    #[must_use]
    pub fn new(proxies: impl IntoIterator<Item = String>) -> Self {
        Self {
            pool: Mutex::new(
                proxies
                    .into_iter()
                    .map(|endpoint| Lease {
                        endpoint,
                        in_use: false,
                    })
                    .collect(),
            ),
        }
    }

    /// Number of proxies currently leased.
    #[must_use]
    pub fn leased(&self) -> usize {
        self.pool.lock().iter().filter(|l| l.in_use).count()
    }
}

#[async_trait]
impl ProxyStore for InMemoryProxyStore {
    async fn lease_free(&self) -> Result<Option<String>, ResourceError> {
        let mut pool = self.pool.lock();
        for lease in pool.iter_mut() {
            if !lease.in_use {
                lease.in_use = true;
                return Ok(Some(lease.endpoint.clone()));
            }
        }
        Ok(None)
    }

    async fn release(&self, proxy: &str) -> Result<(), ResourceError> {
        let mut pool = self.pool.lock();
        if let Some(lease) = pool.iter_mut().find(|l| l.endpoint == proxy) {
            lease.in_use = false;
        }
        Ok(())
    }

    async fn reset_all(&self) -> Result<(), ResourceError> {
        for lease in self.pool.lock().iter_mut() {
            lease.in_use = false;
        }
        Ok(())
    }
}

/// Hands out exclusive proxy leases.
///
/// When the pool is exhausted the rotator resets every lease and retries
/// acquisition once; an empty pool after reset is a configuration error.
#[derive(Clone)]
pub struct ProxyRotator {
    store: Arc<dyn ProxyStore>,
}

impl std::fmt::Debug for ProxyRotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyRotator").finish_non_exhaustive()
    }
}

impl ProxyRotator {
    /// Create a rotator over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn ProxyStore>) -> Self {
        Self { store }
    }

    /// Acquire a free proxy.
    pub async fn acquire(&self) -> Result<String, ResourceError> {
        if let Some(proxy) = self.store.lease_free().await? {
            debug!(%proxy, "leased proxy");
            return Ok(proxy);
        }

        warn!("proxy pool exhausted, resetting all leases");
        self.store.reset_all().await?;

        match self.store.lease_free().await? {
            Some(proxy) => {
                debug!(%proxy, "leased proxy after pool reset");
                Ok(proxy)
            }
            None => Err(ResourceError::NoProxiesConfigured),
        }
    }

    /// Release a leased proxy. Idempotent.
    pub async fn release(&self, proxy: &str) -> Result<(), ResourceError> {
        self.store.release(proxy).await
    }
}
