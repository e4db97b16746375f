//! YAML configuration for the facegate binary.
//!
//! Stored at ~/.facegate/config.yaml unless `--config` points elsewhere. A
//! missing file means all defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use facegate_embed::{EmbedConfig, ModelFamily};
use facegate_faceid::{DEFAULT_THRESHOLD, GateConfig, MatchPolicy, SyncConfig};
use serde::{Deserialize, Serialize};

/// Default base configuration directory name.
pub const DEFAULT_BASE_DIR: &str = ".facegate";
/// Default configuration filename.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub embedder: EmbedderConfig,
    pub matching: MatchingConfig,
    pub sync: SyncSection,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// redb database file. Relative paths resolve against the config dir.
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "identities.redb".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    /// Model service base URL; `$VAR` and `${VAR}` are expanded.
    pub base_url: String,
    pub model: ModelFamily,
    pub detector_backend: String,
    /// Bearer token; `$VAR` and `${VAR}` are expanded.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    pub timeout_secs: u64,
    /// Expected vector length; 0 accepts whatever the slot already holds.
    pub dimension: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".into(),
            model: ModelFamily::default(),
            detector_backend: facegate_embed::DEFAULT_DETECTOR_BACKEND.into(),
            api_key: String::new(),
            timeout_secs: 30,
            dimension: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub threshold: f32,
    pub policy: MatchPolicy,
    /// Embedding slot; empty means the model's own slot.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub slot: String,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            policy: MatchPolicy::default(),
            slot: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub concurrency: usize,
    pub timeout_secs: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        let d = SyncConfig::default();
        Self {
            concurrency: d.concurrency,
            timeout_secs: d.timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: ":8080".into(),
        }
    }
}

impl Config {
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_BASE_DIR))
    }

    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join(DEFAULT_CONFIG_FILE))
    }

    /// Effective embedding slot.
    pub fn slot(&self) -> String {
        if self.matching.slot.is_empty() {
            self.embedder.model.default_slot().to_string()
        } else {
            self.matching.slot.clone()
        }
    }

    pub fn embed_config(&self) -> EmbedConfig {
        EmbedConfig::default()
            .with_base_url(&expand_env(&self.embedder.base_url))
            .with_api_key(&expand_env(&self.embedder.api_key))
            .with_model(self.embedder.model)
            .with_detector_backend(&self.embedder.detector_backend)
            .with_timeout(Duration::from_secs(self.embedder.timeout_secs.max(1)))
            .with_dimension(self.embedder.dimension)
    }

    pub fn gate_config(&self) -> GateConfig {
        let slot = self.slot();
        GateConfig {
            threshold: self.matching.threshold,
            policy: self.matching.policy,
            slot: slot.clone(),
            sync: SyncConfig {
                slot,
                concurrency: self.sync.concurrency,
                timeout: Duration::from_secs(self.sync.timeout_secs.max(1)),
                dimension: self.embedder.dimension,
            },
        }
    }
}

/// Loads the config file, falling back to defaults when it does not exist.
///
/// Returns the config and the directory relative store paths resolve against.
pub fn load_config(custom_path: Option<&str>) -> Result<(Config, PathBuf)> {
    let config_path = match custom_path {
        Some(p) => PathBuf::from(p),
        None => Config::default_config_path()
            .ok_or_else(|| anyhow::anyhow!("cannot determine config path"))?,
    };
    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    if !config_path.exists() {
        if custom_path.is_some() {
            anyhow::bail!("config file not found: {}", config_path.display());
        }
        return Ok((Config::default(), base_dir));
    }

    let content = std::fs::read_to_string(&config_path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    Ok((cfg, base_dir))
}

/// Resolves the store path against `base_dir` unless it is absolute.
pub fn store_path(cfg: &Config, base_dir: &Path) -> PathBuf {
    let p = PathBuf::from(&cfg.store.path);
    if p.is_absolute() {
        p
    } else {
        base_dir.join(p)
    }
}

/// Expand a whole-value `$VAR` or `${VAR}` reference. Unset variables
/// expand to the empty string; anything else is returned unchanged.
pub fn expand_env(s: &str) -> String {
    let Some(rest) = s.strip_prefix('$') else {
        return s.to_string();
    };
    let var_name = match rest.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
        Some(name) => name,
        None => rest,
    };
    std::env::var(var_name).unwrap_or_default()
}

/// Parse address string to SocketAddr; ":8080" binds all interfaces.
pub fn parse_addr(addr: &str) -> Result<SocketAddr> {
    let addr = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };
    Ok(addr.parse()?)
}
