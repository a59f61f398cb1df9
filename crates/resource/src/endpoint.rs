//! Cyclic endpoint rotation with per-endpoint failure counters.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use caravan_core::NetworkKey;
use caravan_resilience::FailureSink;

use crate::error::ResourceError;

/// One configured upstream endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    /// Endpoint URL.
    pub url: String,
    /// Failures tolerated on this endpoint before rotating away from it.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

#[derive(Debug)]
struct Rotation {
    current: usize,
    /// Failure count of the currently selected endpoint. Reset on rotation.
    failures: u32,
}

/// One logical upstream's ordered endpoint list with a shared current-index
/// pointer.
///
/// Rotation advances the index cyclically and resets the newly selected
/// endpoint's failure counter. Rotating a single-endpoint list is a logged
/// no-op rather than an error.
#[derive(Debug)]
pub struct EndpointSet {
    network: NetworkKey,
    endpoints: Vec<Endpoint>,
    rotation: Mutex<Rotation>,
}

impl EndpointSet {
    /// Create a set for `network`. Fails on an empty endpoint list.
    pub fn new(network: NetworkKey, endpoints: Vec<Endpoint>) -> Result<Self, ResourceError> {
        if endpoints.is_empty() {
            return Err(ResourceError::NoEndpoints(network));
        }
        Ok(Self {
            network,
            endpoints,
            rotation: Mutex::new(Rotation {
                current: 0,
                failures: 0,
            }),
        })
    }

    /// The network this set serves.
    #[must_use]
    pub fn network(&self) -> &NetworkKey {
        &self.network
    }

    /// URL of the currently selected endpoint.
    #[must_use]
    pub fn current_url(&self) -> String {
        self.endpoints[self.rotation.lock().current].url.clone()
    }

    /// Index of the currently selected endpoint.
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.rotation.lock().current
    }

    /// Failure count of the currently selected endpoint.
    #[must_use]
    pub fn current_failures(&self) -> u32 {
        self.rotation.lock().failures
    }

    /// Number of configured endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always `false`: construction rejects empty lists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    fn rotate_locked(&self, rotation: &mut Rotation) {
        if self.endpoints.len() == 1 {
            warn!(
                network = %self.network,
                url = %self.endpoints[0].url,
                "only one endpoint configured, rotation is a no-op"
            );
            rotation.failures = 0;
            return;
        }
        let from = rotation.current;
        rotation.current = (rotation.current + 1) % self.endpoints.len();
        rotation.failures = 0;
        debug!(
            network = %self.network,
            from = %self.endpoints[from].url,
            to = %self.endpoints[rotation.current].url,
            "rotated endpoint"
        );
    }
}

impl FailureSink for EndpointSet {
    /// Count one failure against the active endpoint; rotate once its own
    /// `max_retries` threshold is reached.
    fn record_failure(&self) {
        let mut rotation = self.rotation.lock();
        rotation.failures += 1;
        let threshold = self.endpoints[rotation.current].max_retries;
        if rotation.failures >= threshold {
            self.rotate_locked(&mut rotation);
        }
    }

    /// Force an immediate advance to the next endpoint.
    fn rotate(&self) {
        let mut rotation = self.rotation.lock();
        self.rotate_locked(&mut rotation);
    }
}

/// The explicit map from network key to endpoint set.
///
/// Built once at startup from configuration; lookups of unknown networks
/// are errors, so misconfigured presets fail before any action runs.
#[derive(Debug, Clone, Default)]
pub struct EndpointDirectory {
    networks: HashMap<NetworkKey, Arc<EndpointSet>>,
}

impl EndpointDirectory {
    /// Build a directory, validating every endpoint list is non-empty.
    pub fn new(
        networks: impl IntoIterator<Item = (NetworkKey, Vec<Endpoint>)>,
    ) -> Result<Self, ResourceError> {
        let mut map = HashMap::new();
        for (network, endpoints) in networks {
            let set = EndpointSet::new(network.clone(), endpoints)?;
            map.insert(network, Arc::new(set));
        }
        Ok(Self { networks: map })
    }

    /// Look up the endpoint set for a network.
    pub fn get(&self, network: &NetworkKey) -> Result<Arc<EndpointSet>, ResourceError> {
        self.networks
            .get(network)
            .cloned()
            .ok_or_else(|| ResourceError::UnknownNetwork(network.clone()))
    }

    /// Whether a network is configured.
    #[must_use]
    pub fn contains(&self, network: &NetworkKey) -> bool {
        self.networks.contains_key(network)
    }

    /// Configured network keys.
    pub fn networks(&self) -> impl Iterator<Item = &NetworkKey> {
        self.networks.keys()
    }
}
