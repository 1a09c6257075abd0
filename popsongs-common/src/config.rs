//! Configuration loading for popsongs
//!
//! Two sources feed a run:
//! 1. **TOML file** (optional): artist/market lists, catalog endpoints, retry
//!    policy, logging. Missing file → built-in defaults.
//! 2. **Environment**: secrets only (catalog client credentials, warehouse
//!    connection). These are never read from the TOML file.
//!
//! # Config file priority
//!
//! 1. Command-line argument (`--config`)
//! 2. `POPSONGS_CONFIG` environment variable
//! 3. `<user config dir>/popsongs/config.toml`, if it exists
//! 4. Built-in defaults

use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "POPSONGS_CONFIG";

pub const ENV_CLIENT_ID: &str = "SPOTIFY_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "SPOTIFY_CLIENT_SECRET";
pub const ENV_WAREHOUSE_URL: &str = "REDSHIFT_URL";
pub const ENV_WAREHOUSE_SCHEMA: &str = "REDSHIFT_SCHEMA";
pub const ENV_WAREHOUSE_USER: &str = "REDSHIFT_USER";
pub const ENV_WAREHOUSE_PASSWORD: &str = "REDSHIFT_PASSWORD";

/// Artists queried when no config file overrides the list
pub const DEFAULT_ARTISTS: [&str; 5] = [
    "Phill Collins",
    "Soda Stereo",
    "Arctic Monkeys",
    "Tears For Fears",
    "Wos",
];

/// Markets queried when no config file overrides the list
pub const DEFAULT_MARKETS: [&str; 4] = ["AR", "BR", "US", "MX"];

/// The catalog's fixed top-tracks page size
pub const DEFAULT_TRACKS_PER_ARTIST_PER_MARKET: usize = 10;

/// Destination table name inside the configured schema
pub const DESTINATION_TABLE: &str = "popular_songs";

/// File-backed configuration
///
/// Every section is optional; absent sections fall back to defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    pub pipeline: PipelineConfig,
    pub catalog: CatalogSettings,
    pub retry: RetryPolicy,
    pub logging: LoggingConfig,
}

impl TomlConfig {
    /// Parse a config file and validate it
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Read {} failed: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse config text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config file (see module docs) and load it, or defaults
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path)? {
            Some(path) => Self::from_file(&path),
            None => {
                info!("No configuration file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        self.catalog.validate()?;
        self.retry.validate()
    }
}

/// Locate the config file to load, if any
///
/// An explicitly named file (CLI or environment) must exist; the per-user
/// default location is only used when present.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = cli_path {
        return existing(path.to_path_buf(), "--config");
    }

    if let Some(value) = non_blank_env(CONFIG_ENV_VAR) {
        return existing(PathBuf::from(value), CONFIG_ENV_VAR);
    }

    let user_config = dirs::config_dir().map(|d| d.join("popsongs").join("config.toml"));
    match user_config {
        Some(path) if path.exists() => Ok(Some(path)),
        _ => Ok(None),
    }
}

fn existing(path: PathBuf, source: &str) -> Result<Option<PathBuf>> {
    if path.exists() {
        debug!(source, path = %path.display(), "Using configuration file");
        Ok(Some(path))
    } else {
        Err(Error::Config(format!(
            "Config file named by {} not found: {}",
            source,
            path.display()
        )))
    }
}

/// What to do when an artist name matches nothing in the catalog
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MissingArtistPolicy {
    /// Abort the run
    #[default]
    Fail,
    /// Drop the artist from this run and log a warning
    Skip,
}

/// The artists and markets a run covers
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Artist names, in query order
    pub artists: Vec<String>,
    /// Market (country) codes, in query order
    pub markets: Vec<String>,
    /// Expected top-tracks page size per (artist, market)
    pub tracks_per_artist_per_market: usize,
    pub on_missing_artist: MissingArtistPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            artists: DEFAULT_ARTISTS.iter().map(|s| s.to_string()).collect(),
            markets: DEFAULT_MARKETS.iter().map(|s| s.to_string()).collect(),
            tracks_per_artist_per_market: DEFAULT_TRACKS_PER_ARTIST_PER_MARKET,
            on_missing_artist: MissingArtistPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.artists.is_empty() {
            return Err(Error::InvalidInput("pipeline.artists is empty".to_string()));
        }
        if self.markets.is_empty() {
            return Err(Error::InvalidInput("pipeline.markets is empty".to_string()));
        }
        if let Some(blank) = self.artists.iter().position(|a| a.trim().is_empty()) {
            return Err(Error::InvalidInput(format!(
                "pipeline.artists[{}] is blank",
                blank
            )));
        }
        for market in &self.markets {
            if market.len() != 2 || !market.chars().all(|c| c.is_ascii_uppercase()) {
                return Err(Error::InvalidInput(format!(
                    "pipeline.markets: '{}' is not an ISO 3166-1 alpha-2 code",
                    market
                )));
            }
        }
        if self.tracks_per_artist_per_market == 0 {
            return Err(Error::InvalidInput(
                "pipeline.tracks_per_artist_per_market must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Catalog API endpoints and transport settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogSettings {
    /// Base URL of the accounts service (token endpoint lives at `/api/token`)
    pub accounts_url: String,
    /// Base URL of the Web API
    pub api_url: String,
    pub request_timeout_secs: u64,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            accounts_url: "https://accounts.spotify.com".to_string(),
            api_url: "https://api.spotify.com/v1".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl CatalogSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        for (key, url) in [("accounts_url", &self.accounts_url), ("api_url", &self.api_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::InvalidInput(format!(
                    "catalog.{} must be an http(s) URL, got '{}'",
                    key, url
                )));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidInput(
                "catalog.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Retry policy for catalog calls
///
/// `max_attempts = 1` means a single attempt with no retry.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn single_attempt() -> Self {
        Self::default()
    }

    /// Delay before retry number `retry` (1-based), doubling up to the cap
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidInput(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(Error::InvalidInput(
                "retry.initial_backoff_ms exceeds retry.max_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Client-credentials pair for the catalog API
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            client_id: required_env(ENV_CLIENT_ID)?.trim().to_string(),
            client_secret: required_env(ENV_CLIENT_SECRET)?,
        })
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Warehouse connection settings
#[derive(Clone, PartialEq, Eq)]
pub struct WarehouseSettings {
    /// Connection URL (postgres://, redshift:// or a jdbc: form of either)
    pub url: String,
    pub schema: String,
    pub user: String,
    pub password: String,
}

impl WarehouseSettings {
    pub fn from_env() -> Result<Self> {
        let settings = Self {
            url: required_env(ENV_WAREHOUSE_URL)?.trim().to_string(),
            schema: required_env(ENV_WAREHOUSE_SCHEMA)?.trim().to_string(),
            user: required_env(ENV_WAREHOUSE_USER)?.trim().to_string(),
            password: required_env(ENV_WAREHOUSE_PASSWORD)?,
        };
        settings.destination_table()?;
        Ok(settings)
    }

    /// `<schema>.popular_songs`, with the schema checked to be a plain identifier
    pub fn destination_table(&self) -> Result<String> {
        if !is_plain_identifier(&self.schema) {
            return Err(Error::InvalidInput(format!(
                "warehouse schema '{}' is not a plain SQL identifier",
                self.schema
            )));
        }
        Ok(format!("{}.{}", self.schema, DESTINATION_TABLE))
    }
}

impl fmt::Debug for WarehouseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseSettings")
            .field("url", &self.url)
            .field("schema", &self.schema)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn non_blank_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Read a required environment variable (blank counts as unset)
///
/// The value comes back exactly as set; callers trim identifiers themselves
/// so secrets keep any surrounding whitespace.
pub fn required_env(name: &str) -> Result<String> {
    non_blank_env(name).ok_or_else(|| Error::MissingEnv(name.to_string()))
}
