//! On-disk configuration.
//!
//! Lives at `<config dir>/spotify-autopilot/config.json`, next to the
//! stored credential. A missing file is written out with defaults on
//! first run so there is something to edit.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::mapping::MappingEntry;

pub const CONFIG_DIR_NAME: &str = "spotify-autopilot";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const CREDENTIALS_FILE_NAME: &str = "credentials.json";

const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Which observation strategy the engine runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplerKind {
    /// The process owning the focused window.
    #[default]
    Foreground,
    /// First watched application found in the process table.
    ProcessScan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub poll_interval_secs: u64,
    pub sampler: SamplerKind,
    /// Context to play when the active identity has no mapping. Off by
    /// default: an unmapped application leaves playback alone.
    pub fallback_context: Option<String>,
    pub mappings: Vec<MappingEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            sampler: SamplerKind::default(),
            fallback_context: None,
            // starter rows so the first-run file shows the shape
            mappings: vec![
                MappingEntry::new(
                    "code",
                    "spotify:playlist:37i9dQZF1DX5trt9i14X7j",
                    "Coding Mode",
                ),
                MappingEntry::new(
                    "chrome",
                    "spotify:playlist:37i9dQZF1DX8NTLI2TtZa6",
                    "Deep Focus",
                ),
            ],
        }
    }
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .context("Could not determine the user config directory")?
            .join(CONFIG_DIR_NAME))
    }

    pub fn path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    pub fn credentials_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CREDENTIALS_FILE_NAME))
    }

    /// Load the config, writing a default one on first run.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        if !path.exists() {
            let config = Self::default();
            config.save_to(&path)?;
            log::info!("wrote a starter config to {}", path.display());
            return Ok(config);
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Malformed config {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// `SPOTIFY_CLIENT_ID` / `SPOTIFY_CLIENT_SECRET` take precedence over
    /// the file, so secrets can stay in the environment or a `.env`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("SPOTIFY_CLIENT_ID") {
            if !id.is_empty() {
                self.client_id = id;
            }
        }
        if let Ok(secret) = std::env::var("SPOTIFY_CLIENT_SECRET") {
            if !secret.is_empty() {
                self.client_secret = secret;
            }
        }
    }

    /// Poll cadence, clamped to at least one second.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}
