use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Environment variables that carry secrets. Secrets never land in
/// `config.json`.
const ENV_GEMINI_KEY: &str = "WANDER_GEMINI_API_KEY";
const ENV_UNSPLASH_KEY: &str = "WANDER_UNSPLASH_ACCESS_KEY";
const ENV_FIRESTORE_KEY: &str = "WANDER_FIRESTORE_API_KEY";

// ---------------------------------------------------------------------------
// WanderConfig
// ---------------------------------------------------------------------------

/// Engine configuration stored at `~/.wander/config.json`.
/// API keys come from the environment only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WanderConfig {
    #[serde(skip)]
    pub gemini_api_key: Option<String>,
    #[serde(skip)]
    pub unsplash_access_key: Option<String>,
    #[serde(skip)]
    pub firestore_api_key: Option<String>,

    // Connectivity
    pub probe_url: String,
    pub probe_timeout_ms: u64,
    pub connectivity_cache_secs: u64,

    // Freshness
    pub enrichment_ttl_minutes: i64,
    pub weather_ttl_minutes: i64,

    // Remote services
    pub remote_timeout_secs: u64,
    pub gemini_model: String,
    pub firestore_project_id: Option<String>,
    pub destinations_collection: String,
    pub enrich_on_resolve: bool,

    // On-device model
    pub local_model_path: Option<PathBuf>,
    pub local_server_url: String,
    pub local_timeout_secs: u64,
    pub local_max_tokens: u32,
    pub max_context_sentences: usize,

    pub log_level: String,
}

impl Default for WanderConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            unsplash_access_key: None,
            firestore_api_key: None,
            probe_url: "https://clients3.google.com/generate_204".into(),
            probe_timeout_ms: 3_000,
            connectivity_cache_secs: 5,
            enrichment_ttl_minutes: 5,
            weather_ttl_minutes: 15,
            remote_timeout_secs: 20,
            gemini_model: "gemini-2.0-flash".into(),
            firestore_project_id: None,
            destinations_collection: "destinations".into(),
            enrich_on_resolve: true,
            local_model_path: None,
            local_server_url: "http://127.0.0.1:8081".into(),
            local_timeout_secs: 45,
            local_max_tokens: 120,
            max_context_sentences: 3,
            log_level: "info".into(),
        }
    }
}

impl WanderConfig {
    /// Returns the base directory: `~/.wander/`
    pub fn base_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".wander"))
    }

    /// Returns the config file path: `~/.wander/config.json`
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("config.json"))
    }

    /// Returns the logs directory: `~/.wander/logs/`
    pub fn logs_dir() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("logs"))
    }

    /// Returns the database path: `~/.wander/wander.db`
    pub fn db_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("wander.db"))
    }

    /// Returns the default on-device model location: `~/.wander/models/`
    pub fn models_dir() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("models"))
    }

    /// Ensures all required directories exist.
    pub fn ensure_dirs() -> Result<()> {
        let dirs = [Self::base_dir()?, Self::logs_dir()?, Self::models_dir()?];
        for dir in &dirs {
            if !dir.exists() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            }
        }
        Ok(())
    }

    /// Loads config from disk (creating a default file if missing), then
    /// layers secrets from the environment.
    pub fn load() -> Result<Self> {
        Self::ensure_dirs()?;
        let path = Self::config_path()?;
        let mut config = Self::load_from_path(&path)?;
        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific file path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let config: Self =
                serde_json::from_str(&content).with_context(|| "Failed to parse config.json")?;
            info!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to_path(path)?;
            info!("Created default config at {}", path.display());
            Ok(config)
        }
    }

    /// Save config to a specific file path (secrets are skipped).
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Pull secrets from the process environment. Empty values count as unset.
    pub fn apply_env(&mut self) {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        if let Some(key) = read(ENV_GEMINI_KEY) {
            self.gemini_api_key = Some(key);
        }
        if let Some(key) = read(ENV_UNSPLASH_KEY) {
            self.unsplash_access_key = Some(key);
        }
        if let Some(key) = read(ENV_FIRESTORE_KEY) {
            self.firestore_api_key = Some(key);
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn connectivity_cache_window(&self) -> Duration {
        Duration::from_secs(self.connectivity_cache_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn local_timeout(&self) -> Duration {
        Duration::from_secs(self.local_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Freshness policy
// ---------------------------------------------------------------------------

/// Data kinds whose refreshes are tracked independently of their payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessKind {
    /// AI-generated fields merged into a destination.
    Enrichment,
    /// Weather-like display data.
    Weather,
}

impl FreshnessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enrichment => "enrichment",
            Self::Weather => "weather",
        }
    }
}

impl std::fmt::Display for FreshnessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-kind TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub enrichment_ttl: chrono::Duration,
    pub weather_ttl: chrono::Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::from_config(&WanderConfig::default())
    }
}

impl FreshnessPolicy {
    pub fn from_config(config: &WanderConfig) -> Self {
        Self {
            enrichment_ttl: ttl_from_minutes(config.enrichment_ttl_minutes),
            weather_ttl: ttl_from_minutes(config.weather_ttl_minutes),
        }
    }

    pub fn ttl(&self, kind: FreshnessKind) -> chrono::Duration {
        match kind {
            FreshnessKind::Enrichment => self.enrichment_ttl,
            FreshnessKind::Weather => self.weather_ttl,
        }
    }
}

/// Negative values clamp to zero, out-of-range values to the longest TTL.
fn ttl_from_minutes(minutes: i64) -> chrono::Duration {
    chrono::Duration::try_minutes(minutes.max(0)).unwrap_or(chrono::Duration::MAX)
}
