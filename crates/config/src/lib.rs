#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Caravan Config
//!
//! Layered settings for the caravan binaries: hard-coded defaults, then
//! a TOML file, then `CARAVAN_`-prefixed environment variables — last
//! layer wins.
//!
//! ```toml
//! [database]
//! path = "caravan.db"
//!
//! [engine]
//! accounts_per_flow = 5
//! account_delay = { min_secs = 5.0, max_secs = 15.0 }
//!
//! [networks.ethereum]
//! endpoints = [
//!   { url = "https://rpc.example/eth", max_retries = 3 },
//!   { url = "https://backup.example/eth", max_retries = 5 },
//! ]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use figment::providers::{Env, Format as _, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use caravan_core::NetworkKey;
use caravan_engine::EngineSettings;
use caravan_resource::{Endpoint, EndpointDirectory, ResourceError};

/// Default settings file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "caravan.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Extraction through the layered providers failed.
    #[error(transparent)]
    Figment(#[from] Box<figment::Error>),

    /// The endpoint directory rejected the network configuration.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// Where the database lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Sqlite file path.
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("caravan.db"),
        }
    }
}

/// Telegram notification settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramSettings {
    /// Send notifications at all.
    pub enabled: bool,
    /// Bot API token.
    pub bot_token: String,
    /// Destination chat.
    pub chat_id: String,
}

/// One network's endpoint list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Ordered endpoint list; the first entry is tried first.
    pub endpoints: Vec<Endpoint>,
}

/// The full settings tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Database location.
    pub database: DatabaseSettings,
    /// Engine tunables.
    pub engine: EngineSettings,
    /// Logger configuration.
    pub logging: caravan_log::Config,
    /// Telegram notifications.
    pub telegram: TelegramSettings,
    /// Endpoint lists keyed by network.
    pub networks: BTreeMap<NetworkKey, NetworkSettings>,
}

impl Settings {
    /// Load settings: defaults, then the TOML file (the default file name
    /// when `path` is `None`; missing files contribute nothing), then
    /// `CARAVAN_`-prefixed environment variables with `__` as the level
    /// separator.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf);
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("CARAVAN_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Figment(Box::new(e)))
    }

    /// Build the validated endpoint directory from the network settings.
    pub fn endpoint_directory(&self) -> Result<EndpointDirectory, ConfigError> {
        let directory = EndpointDirectory::new(
            self.networks
                .iter()
                .map(|(key, network)| (key.clone(), network.endpoints.clone())),
        )?;
        Ok(directory)
    }
}
