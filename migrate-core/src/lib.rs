//! Core record store library
//!
//! This crate provides the store-facing half of the blog migrator: the
//! [`RemoteStore`] capability, the wire types sent over it, a REST client
//! implementing it, and the connection settings it is built from.

pub mod api;
pub mod credentials;
pub mod store;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use api::{MigrationRecord, RestStoreClient, Row, StoreError, StoredRecord};
pub use store::RemoteStore;

/// Table every migrated file lands in unless configured otherwise
pub const DEFAULT_TABLE: &str = "blogs";

/// Problems found while validating [`StoreConfig`]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("store URL is missing (set SUPABASE_URL)")]
    MissingUrl,

    #[error("store API key is missing (set SUPABASE_KEY)")]
    MissingKey,

    #[error("store URL '{0}' is not a valid http(s) URL")]
    InvalidUrl(String),
}

/// Connection settings for the record store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub url: String,
    pub api_key: String,
    pub table: String,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            table: DEFAULT_TABLE.to_string(),
            timeout_secs: 30,
        }
    }
}

impl StoreConfig {
    /// Check presence and shape of the settings before any request is made
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        if self.api_key.is_empty() {
            return Err(ConfigError::MissingKey);
        }

        match url::Url::parse(&self.url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
            _ => Err(ConfigError::InvalidUrl(self.url.clone())),
        }
    }

    /// Build a REST client from these settings
    pub fn connect(&self) -> api::Result<RestStoreClient> {
        api::RestStoreClientBuilder::new(&self.url, &self.api_key)
            .timeout(Duration::from_secs(self.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
    }
}

/// Strip whitespace and one layer of matching quotes from a configured value
pub fn clean_value(raw: &str) -> String {
    let trimmed = raw.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|s| s.strip_suffix(quote))
        {
            return inner.trim().to_string();
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str, key: &str) -> StoreConfig {
        StoreConfig {
            url: url.to_string(),
            api_key: key.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_store_config_default() {
        let config = StoreConfig::default();
        assert_eq!(config.table, "blogs");
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_validate() {
        assert_eq!(config("", "key").validate(), Err(ConfigError::MissingUrl));
        assert_eq!(config("https://x.supabase.co", "").validate(), Err(ConfigError::MissingKey));
        assert!(matches!(
            config("x.supabase.co", "key").validate(),
            Err(ConfigError::InvalidUrl(_))
        ));
        assert!(matches!(
            config("ftp://x.supabase.co", "key").validate(),
            Err(ConfigError::InvalidUrl(_))
        ));
        assert!(config("https://x.supabase.co", "key").validate().is_ok());
    }

    #[test]
    fn test_clean_value() {
        assert_eq!(clean_value("  \"https://x.supabase.co\" "), "https://x.supabase.co");
        assert_eq!(clean_value("'abc'"), "abc");
        assert_eq!(clean_value("\"abc'"), "\"abc'");
        assert_eq!(clean_value("plain"), "plain");
    }
}
