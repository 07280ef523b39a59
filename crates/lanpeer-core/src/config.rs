//! Configuration system for lanpeer.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $LANPEER_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/lanpeer/config.toml
//!   3. ~/.config/lanpeer/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::wire::{DEFAULT_HTTP_PORT, DISCOVER_PORT};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanpeerConfig {
    pub network: NetworkConfig,
    pub liveness: LivenessConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// UDP port for announce traffic. All nodes must agree on this.
    pub discover_port: u16,
    /// Liveness HTTP port. 0 = allocate an ephemeral port.
    pub http_port: u16,
    /// Port used when ephemeral allocation fails.
    pub fallback_http_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Server-side delay before answering /active-peer-alive-check, in
    /// seconds. This delay is what paces remote pollers.
    pub alive_check_delay_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for LanpeerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            liveness: LivenessConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            discover_port: DISCOVER_PORT,
            http_port: 0,
            fallback_http_port: DEFAULT_HTTP_PORT,
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            alive_check_delay_secs: 10,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("lanpeer")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl LanpeerConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            LanpeerConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("LANPEER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&LanpeerConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply LANPEER_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LANPEER_NETWORK__DISCOVER_PORT") {
            if let Ok(p) = v.parse() {
                self.network.discover_port = p;
            }
        }
        if let Ok(v) = std::env::var("LANPEER_NETWORK__HTTP_PORT") {
            if let Ok(p) = v.parse() {
                self.network.http_port = p;
            }
        }
        if let Ok(v) = std::env::var("LANPEER_LIVENESS__ALIVE_CHECK_DELAY_SECS") {
            if let Ok(s) = v.parse() {
                self.liveness.alive_check_delay_secs = s;
            }
        }
    }
}
