//! Configuration for chunkwire.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $CHUNKWIRE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/chunkwire/config.toml
//!   3. ~/.config/chunkwire/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkwireConfig {
    pub serialization: SerializationConfig,
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializationConfig {
    /// Let peeks turn structured or placeholder content into bytes without
    /// an explicit allowance.
    pub implicit: bool,
}

/// Parameters of the demo stream transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Seed for the link's reordering and duplication.
    pub seed: u64,
    /// Application bytes to send.
    pub message_bytes: usize,
    /// Maximum payload bytes per segment.
    pub segment_bytes: usize,
    /// Maximum bytes of a segment carried per link fragment.
    pub fragment_bytes: usize,
    /// Fragments in flight that the link may shuffle. 1 = in order.
    pub reorder_window: usize,
    /// Chance (percent) that the link delivers a fragment twice.
    pub duplicate_percent: u8,
    /// Serialize segments to bytes before fragmenting them.
    pub serialize_on_wire: bool,
    /// Send placeholder content instead of real application bytes.
    pub placeholder_payload: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            seed: 0x00c0_ffee,
            message_bytes: 64 * 1024,
            segment_bytes: 1460,
            fragment_bytes: 576,
            reorder_window: 4,
            duplicate_percent: 5,
            serialize_on_wire: true,
            placeholder_payload: false,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("chunkwire")
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

impl ChunkwireConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            ChunkwireConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse one file, without env overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("CHUNKWIRE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write the default config to `path` unless a file is already there.
    pub fn write_default_if_missing(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text = toml::to_string_pretty(&ChunkwireConfig::default())
            .map_err(ConfigError::SerializeFailed)?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))
    }

    /// Apply CHUNKWIRE_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("CHUNKWIRE_SERIALIZATION__IMPLICIT") {
            self.serialization.implicit = v == "true" || v == "1";
        }
        if let Some(v) = lookup("CHUNKWIRE_TRANSFER__SEED") {
            if let Ok(seed) = v.parse() {
                self.transfer.seed = seed;
            }
        }
        if let Some(v) = lookup("CHUNKWIRE_TRANSFER__SERIALIZE_ON_WIRE") {
            self.transfer.serialize_on_wire = v == "true" || v == "1";
        }
    }
}
