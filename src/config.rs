use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::fetch::client::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use crate::fetch::rate_limit::{DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};
use crate::orchestrator::DEFAULT_INTER_ITEM_DELAY;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("failed to parse configuration {path} as TOML: {source}")]
    Parse { path: String, source: toml::de::Error },
    #[error("no FRED API key available")]
    MissingApiKey,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct CatalogPaths {
    pub h8: Option<PathBuf>,
    pub h41: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig { max_requests: DEFAULT_MAX_REQUESTS, window_seconds: DEFAULT_WINDOW.as_secs() }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig { max_attempts: DEFAULT_MAX_ATTEMPTS, delay_seconds: DEFAULT_RETRY_DELAY.as_secs() }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DownloadConfig {
    pub inter_item_delay_seconds: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        DownloadConfig { inter_item_delay_seconds: DEFAULT_INTER_ITEM_DELAY.as_secs() }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub data_root: PathBuf,
    pub catalogs: CatalogPaths,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub download: DownloadConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        AcquisitionConfig {
            data_root: PathBuf::from("data"),
            catalogs: CatalogPaths::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            download: DownloadConfig::default(),
        }
    }
}

impl AcquisitionConfig {
    /// Reads the config at `path`. A missing file is not an error, defaults are used instead.
    pub fn load(path: &Path) -> Result<AcquisitionConfig, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => { AcquisitionConfig::from_toml(&text, path) },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Configuration {} not found, using defaults.", path.display());
                Ok(AcquisitionConfig::default())
            },
            Err(e) => {
                Err(ConfigError::Read { path: path.display().to_string(), source: e })
            }
        }
    }

    pub fn from_toml(text: &str, path: &Path) -> Result<AcquisitionConfig, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse { path: path.display().to_string(), source: e })
    }

    pub fn h8_catalog(&self) -> PathBuf {
        match &self.catalogs.h8 {
            Some(p) => { p.clone() },
            None => { self.data_root.join("H8_Series_Ids.txt") }
        }
    }

    pub fn h41_catalog(&self) -> PathBuf {
        match &self.catalogs.h41 {
            Some(p) => { p.clone() },
            None => { self.data_root.join("H41_Series_Ids.txt") }
        }
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit.window_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry.delay_seconds)
    }

    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_secs(self.download.inter_item_delay_seconds)
    }
}

/// Private settings kept out of the main config, e.g. `[fred] key = "..."`.
pub type SecretConfig = HashMap<String, HashMap<String, String>>;

pub fn load_secret_config(path: &Path) -> Result<Option<SecretConfig>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(s) => {
            let parsed = toml::from_str(&s)
                .map_err(|e| ConfigError::Parse { path: path.display().to_string(), source: e })?;
            Ok(Some(parsed))
        },
        Err(_) => { Ok(None) }
    }
}

pub fn api_key_from_secret(secret: Option<&SecretConfig>) -> Option<String> {
    secret
        .and_then(|c| c.get("fred"))
        .and_then(|section| section.get("key"))
        .map(|key| key.trim().to_owned())
        .filter(|key| !key.is_empty())
}

#[test]
fn test_defaults_when_sections_missing() {
    let config = AcquisitionConfig::from_toml("data_root = \"/tmp/fred\"", Path::new("inline")).unwrap();

    assert_eq!(config.data_root, PathBuf::from("/tmp/fred"));
    assert_eq!(config.rate_limit.max_requests, 120);
    assert_eq!(config.rate_window(), Duration::from_secs(60));
    assert_eq!(config.retry.max_attempts, 6);
    assert_eq!(config.retry_delay(), Duration::from_secs(20));
    assert_eq!(config.inter_item_delay(), Duration::from_secs(5));
    assert_eq!(config.h8_catalog(), PathBuf::from("/tmp/fred/H8_Series_Ids.txt"));
    assert_eq!(config.h41_catalog(), PathBuf::from("/tmp/fred/H41_Series_Ids.txt"));
}

#[test]
fn test_defaults_follow_named_constants() {
    let config = AcquisitionConfig::default();

    assert_eq!(config.rate_limit.max_requests, DEFAULT_MAX_REQUESTS);
    assert_eq!(config.rate_window(), DEFAULT_WINDOW);
    assert_eq!(config.retry.max_attempts, DEFAULT_MAX_ATTEMPTS);
    assert_eq!(config.retry_delay(), DEFAULT_RETRY_DELAY);
    assert_eq!(config.inter_item_delay(), DEFAULT_INTER_ITEM_DELAY);
}

#[test]
fn test_explicit_sections() {
    let text = r#"
        data_root = "out"

        [catalogs]
        h8 = "catalogs/h8.txt"

        [retry]
        max_attempts = 3
        delay_seconds = 1

        [download]
        inter_item_delay_seconds = 0
    "#;
    let config = AcquisitionConfig::from_toml(text, Path::new("inline")).unwrap();

    assert_eq!(config.h8_catalog(), PathBuf::from("catalogs/h8.txt"));
    assert_eq!(config.h41_catalog(), PathBuf::from("out/H41_Series_Ids.txt"));
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.inter_item_delay(), Duration::from_secs(0));
}

#[test]
fn test_malformed_config_is_error() {
    let result = AcquisitionConfig::from_toml("data_root = [", Path::new("broken.toml"));
    assert!(matches!(result, Err(ConfigError::Parse { .. })));
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = AcquisitionConfig::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.data_root, PathBuf::from("data"));
}

#[test]
fn test_api_key_from_secret() {
    let secret: SecretConfig = toml::from_str("[fred]\nkey = \" abc123 \"\n").unwrap();
    assert_eq!(api_key_from_secret(Some(&secret)), Some("abc123".to_owned()));

    let blank: SecretConfig = toml::from_str("[fred]\nkey = \"\"\n").unwrap();
    assert_eq!(api_key_from_secret(Some(&blank)), None);
    assert_eq!(api_key_from_secret(None), None);
}
