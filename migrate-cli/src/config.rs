use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use migrate_core::credentials::{display_url, looks_like_jwt, parse_key_claims, redact_key};
use migrate_core::{clean_value, StoreConfig, DEFAULT_TABLE};

/// File looked up in the repository root when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "migrate.toml";

pub const ENV_URL: &str = "SUPABASE_URL";
pub const ENV_KEY: &str = "SUPABASE_KEY";
pub const ENV_DEVICE_ID: &str = "DEVICE_ID";

/// On-disk configuration; every field is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub store: StoreSection,
    pub device_id: Option<String>,
    pub error_dir: Option<PathBuf>,
    pub batch_size: Option<usize>,
    /// Seconds
    pub batch_delay: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    pub url: Option<String>,
    pub key: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            table: default_table(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_table() -> String { DEFAULT_TABLE.to_string() }
fn default_timeout_secs() -> u64 { 30 }
fn default_device_id() -> String { "system".to_string() }

impl FileConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: FileConfig =
            toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// An explicit path must exist; the default file is optional
    pub async fn locate(explicit: Option<&Path>, root: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path).await;
        }

        let default_path = root.join(DEFAULT_CONFIG_FILE);
        if tokio::fs::try_exists(&default_path).await.unwrap_or(false) {
            return Self::load(default_path).await;
        }
        Ok(Self::default())
    }
}

/// Settings after layering the environment over the file
#[derive(Debug, Clone)]
pub struct MigrateConfig {
    pub store: StoreConfig,
    pub device_id: String,
    pub error_dir: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub batch_delay: Option<f64>,
}

impl MigrateConfig {
    /// Environment values win over the file. Blank values count as unset.
    pub fn resolve<F>(file: FileConfig, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |name: &str, fallback: Option<String>| {
            env(name)
                .map(|v| clean_value(&v))
                .filter(|v| !v.is_empty())
                .or_else(|| fallback.map(|v| clean_value(&v)).filter(|v| !v.is_empty()))
        };

        let url = pick(ENV_URL, file.store.url).unwrap_or_default();
        let api_key = pick(ENV_KEY, file.store.key).unwrap_or_default();
        let device_id = pick(ENV_DEVICE_ID, file.device_id).unwrap_or_else(default_device_id);

        Self {
            store: StoreConfig {
                url: url.trim_end_matches('/').to_string(),
                api_key,
                table: file.store.table,
                timeout_secs: file.store.timeout_secs,
            },
            device_id,
            error_dir: file.error_dir,
            batch_size: file.batch_size,
            batch_delay: file.batch_delay,
        }
    }

    pub fn from_env(file: FileConfig) -> Self {
        Self::resolve(file, |name| std::env::var(name).ok())
    }

    /// Lines printed by `--debug`
    pub fn diagnostics(&self) -> Vec<String> {
        let mut lines = vec![
            format!("{} = {}", ENV_URL, display_url(&self.store.url)),
            format!("{} = {}", ENV_KEY, redact_key(&self.store.api_key)),
            format!("{} = {}", ENV_DEVICE_ID, self.device_id),
            format!("table = {}", self.store.table),
        ];

        if let Some(claims) = parse_key_claims(&self.store.api_key) {
            if let Some(role) = &claims.role {
                lines.push(format!("key role = {}", role));
            }
            if let Some(expires_at) = claims.expires_at() {
                let state = if claims.is_expired() { " (expired)" } else { "" };
                lines.push(format!("key expires = {}{}", expires_at.to_rfc3339(), state));
            }
        }
        lines
    }

    /// Non-fatal problems with the credentials
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.store.api_key.is_empty() && !looks_like_jwt(&self.store.api_key) {
            warnings.push(format!(
                "{} doesn't look like a JWT token (expected eyJ...), got a {}-character value",
                ENV_KEY,
                self.store.api_key.chars().count()
            ));
        }
        if parse_key_claims(&self.store.api_key).is_some_and(|c| c.is_expired()) {
            warnings.push(format!("{} has expired", ENV_KEY));
        }
        warnings
    }
}
