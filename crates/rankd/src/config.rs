//! Configuration management for rankd.
//!
//! Loads settings from the path given on the command line, then
//! /etc/rank/rankd.toml. Defaults apply only when the system file is missing.

use anyhow::{Context, Result};
use rank_common::curve::{DEFAULT_BASE, DEFAULT_LINEAR, DEFAULT_QUAD};
use rank_common::{
    CommunityId, CommunitySettings, DbLocation, LevelCurve, SettingsOverride, SettingsRegistry,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/rank/rankd.toml";

/// Daemon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// HTTP listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Ledger database path; XDG data dir when unset
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Seconds between voice XP ticks
    #[serde(default = "default_voice_tick")]
    pub voice_tick_secs: u64,

    /// Activity events buffered before ingest starts refusing
    #[serde(default = "default_event_queue")]
    pub event_queue: usize,
}

fn default_listen() -> String {
    "127.0.0.1:7866".to_string()
}

fn default_voice_tick() -> u64 {
    60
}

fn default_event_queue() -> usize {
    4096
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            database: None,
            voice_tick_secs: default_voice_tick(),
            event_queue: default_event_queue(),
        }
    }
}

impl DaemonConfig {
    pub fn db_location(&self) -> DbLocation {
        match &self.database {
            Some(path) => DbLocation::Custom(path.clone()),
            None => DbLocation::Default,
        }
    }
}

/// Level curve constants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveConfig {
    #[serde(default = "default_base")]
    pub base: u64,

    #[serde(default = "default_quad")]
    pub quad: u64,

    #[serde(default = "default_linear")]
    pub linear: u64,
}

fn default_base() -> u64 {
    DEFAULT_BASE
}

fn default_quad() -> u64 {
    DEFAULT_QUAD
}

fn default_linear() -> u64 {
    DEFAULT_LINEAR
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            base: default_base(),
            quad: default_quad(),
            linear: default_linear(),
        }
    }
}

impl CurveConfig {
    /// Invalid constants fall back to the default curve.
    pub fn to_curve(&self) -> LevelCurve {
        LevelCurve::new(self.base, self.quad, self.linear).unwrap_or_else(|e| {
            warn!("{}, using default curve", e);
            LevelCurve::default()
        })
    }
}

/// Gateway bridge used for role grants and announcements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Base URL; side effects are only logged when unset
    #[serde(default)]
    pub url: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_bridge_timeout")]
    pub timeout_secs: u64,
}

fn default_bridge_timeout() -> u64 {
    5
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_bridge_timeout(),
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub curve: CurveConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Settings for communities without an override
    #[serde(default)]
    pub defaults: CommunitySettings,

    /// Per-community overrides keyed by community id
    #[serde(default)]
    pub communities: BTreeMap<String, SettingsOverride>,
}

impl Config {
    /// Load config from `explicit`, else the system path, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from_path(path),
            None => Self::load_or_default(Path::new(CONFIG_PATH)),
        }
    }

    /// Defaults only when `path` does not exist. A file that exists but
    /// cannot be read or parsed is an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => {
                let config = Self::parse(&content)
                    .with_context(|| format!("Failed to parse {}", path.display()))?;
                info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Config not found at {}, using defaults", path.display());
                Ok(Config::default())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    /// Load config from specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Resolve the per-community settings. Keys that are not ids are skipped.
    pub fn settings_registry(&self) -> SettingsRegistry {
        let mut registry = SettingsRegistry::new(self.defaults.clone());
        for (key, patch) in &self.communities {
            match key.parse::<CommunityId>() {
                Ok(community) => registry = registry.with_override(community, patch),
                Err(_) => warn!("Ignoring settings for '{}': not a community id", key),
            }
        }
        registry
    }
}
