//! Accounts-file ingestion.
//!
//! Credential spreadsheets live outside this workspace; the importable
//! format here is plain TOML.

use serde::Deserialize;

use caravan_route::Account;

/// The importable accounts file.
///
/// ```toml
/// spare_proxies = ["10.0.0.2:8080"]
///
/// [[accounts]]
/// name = "wallet-01"
/// address = "0xabc"
/// private_key = "0xdeadbeef"
/// proxy = "10.0.0.1:8080"
/// ```
#[derive(Debug, Deserialize)]
pub struct AccountsFile {
    /// Accounts to import.
    #[serde(default)]
    pub accounts: Vec<AccountEntry>,
    /// Spare proxies feeding the rotation pool.
    #[serde(default)]
    pub spare_proxies: Vec<String>,
}

/// One account row.
#[derive(Debug, Deserialize)]
pub struct AccountEntry {
    /// Display name, unique per file.
    pub name: String,
    /// On-chain address.
    pub address: String,
    /// Signing secret.
    #[serde(default)]
    pub private_key: Option<String>,
    /// Assigned egress proxy.
    #[serde(default)]
    pub proxy: Option<String>,
    /// User agent for this account's HTTP traffic.
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl AccountsFile {
    /// Parse from TOML text.
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }
}

impl From<AccountEntry> for Account {
    fn from(entry: AccountEntry) -> Self {
        let mut account = Account::new(entry.name, entry.address);
        account.private_key = entry.private_key;
        account.proxy = entry.proxy;
        account.user_agent = entry.user_agent;
        account
    }
}
