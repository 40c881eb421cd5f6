// ABOUTME: Configuration loading from TOML, .env and environment variables
// ABOUTME: Covers database location, provider credentials and scheduler limits

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::scheduler::MIN_CYCLE;
use crate::store::{DEFAULT_DURATION_DAYS, DEFAULT_OWNER};

pub const DEFAULT_CONFIG_FILE: &str = "routewatch.toml";
const API_KEY_PLACEHOLDER: &str = "your_api_key_here";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub scheduler: SchedulerConfig,
    /// Owner recorded on jobs created from this process.
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/routewatch.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub language: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://maps.googleapis.com/maps/api".to_string(),
            timeout_secs: 30,
            language: None,
        }
    }
}

impl ProviderConfig {
    /// The API key, unless it is absent, blank or still the placeholder.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty() && *k != API_KEY_PLACEHOLDER)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Floor applied to every job's cycle.
    pub min_cycle_secs: u64,
    pub default_duration_days: u32,
    /// How often `serve` compares its timers with the persisted job status.
    pub reconcile_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_cycle_secs: MIN_CYCLE.as_secs(),
            default_duration_days: DEFAULT_DURATION_DAYS,
            reconcile_secs: 5,
        }
    }
}

impl Config {
    pub fn owner(&self) -> &str {
        self.owner.as_deref().unwrap_or(DEFAULT_OWNER)
    }

    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, `routewatch.toml` in the
    /// working directory is used when present. Environment variables
    /// (after `.env`) override file values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse TOML configuration")
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("GOOGLE_MAPS_API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Some(db) = lookup("ROUTEWATCH_DB") {
            self.database.path = PathBuf::from(db);
        }
    }
}
