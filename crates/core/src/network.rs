//! Normalized identifiers for logical upstream networks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum allowed length for a [`NetworkKey`].
const NETWORK_KEY_MAX_LEN: usize = 64;

/// Errors from constructing a [`NetworkKey`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkKeyError {
    /// The input was empty or contained only whitespace.
    #[error("network key cannot be empty or whitespace")]
    Empty,
    /// The normalized key contains characters other than `a-z`, `0-9` and `_`.
    #[error("network key contains invalid characters (only a-z, 0-9 and _ allowed)")]
    InvalidCharacters,
    /// The normalized key exceeds [`NETWORK_KEY_MAX_LEN`] characters.
    #[error("network key exceeds maximum length of {NETWORK_KEY_MAX_LEN} characters")]
    TooLong,
}

/// A normalized, validated identifier for a logical upstream network.
///
/// The endpoint directory is keyed by `NetworkKey`, so two spellings of the
/// same network name ("Arbitrum One", `arbitrum-one`) resolve to one entry.
///
/// Normalization rules:
/// - Leading/trailing whitespace is trimmed.
/// - The string is lowercased.
/// - Whitespace and hyphens are replaced with underscores.
/// - Consecutive underscores are collapsed to one.
/// - Leading/trailing underscores are stripped.
///
/// After normalization the key must be non-empty, contain only `a-z`,
/// `0-9` and `_`, and be at most 64 characters long.
///
/// # Examples
///
/// ```
/// use caravan_core::NetworkKey;
///
/// let key: NetworkKey = "Arbitrum One".parse().unwrap();
/// assert_eq!(key.as_str(), "arbitrum_one");
///
/// let key: NetworkKey = " zk-Sync  Era ".parse().unwrap();
/// assert_eq!(key.as_str(), "zk_sync_era");
/// ```
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NetworkKey(String);

impl NetworkKey {
    /// Normalize and validate `input` into a key.
    pub fn new(input: &str) -> Result<Self, NetworkKeyError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(NetworkKeyError::Empty);
        }

        let mut normalized = String::with_capacity(trimmed.len());
        let mut last_was_underscore = true; // strips leading underscores
        for ch in trimmed.chars() {
            let ch = if ch.is_whitespace() || ch == '-' { '_' } else { ch };
            let ch = ch.to_ascii_lowercase();
            if ch == '_' {
                if !last_was_underscore {
                    normalized.push('_');
                }
                last_was_underscore = true;
            } else {
                normalized.push(ch);
                last_was_underscore = false;
            }
        }
        while normalized.ends_with('_') {
            normalized.pop();
        }

        if normalized.is_empty() {
            return Err(NetworkKeyError::Empty);
        }
        if normalized.len() > NETWORK_KEY_MAX_LEN {
            return Err(NetworkKeyError::TooLong);
        }
        if !normalized
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(NetworkKeyError::InvalidCharacters);
        }

        Ok(Self(normalized))
    }

    /// The normalized key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NetworkKey {
    type Err = NetworkKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for NetworkKey {
    type Error = NetworkKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<NetworkKey> for String {
    fn from(key: NetworkKey) -> Self {
        key.0
    }
}
