#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Caravan Log
//!
//! One-call `tracing` setup for the caravan binaries: an
//! [`EnvFilter`](tracing_subscriber::EnvFilter)-driven console subscriber
//! in either a human-readable or JSON format.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// Human-readable console lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Logger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Filter directive, e.g. `info` or `caravan_engine=debug,info`.
    /// `RUST_LOG` overrides it when set.
    pub filter: String,
    /// Output format.
    pub format: Format,
    /// ANSI colors (pretty format only).
    pub ansi: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            format: Format::Pretty,
            ansi: true,
        }
    }
}

/// Logger setup errors.
#[derive(Debug, Error)]
pub enum LogError {
    /// The filter directive failed to parse.
    #[error("bad filter directive: {0}")]
    Filter(String),
    /// A global subscriber is already installed.
    #[error("subscriber already installed: {0}")]
    AlreadyInstalled(String),
}

/// Install the global subscriber described by `config`.
pub fn init(config: &Config) -> Result<(), LogError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| LogError::Filter(e.to_string()))?;

    match config.format {
        Format::Pretty => Registry::default()
            .with(filter)
            .with(fmt::layer().with_ansi(config.ansi).with_target(true))
            .try_init()
            .map_err(|e| LogError::AlreadyInstalled(e.to_string())),
        Format::Json => Registry::default()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
            .map_err(|e| LogError::AlreadyInstalled(e.to_string())),
    }
}
