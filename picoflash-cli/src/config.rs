//! Persisted CLI configuration (remembered port and baud rate).

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings remembered between invocations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Last serial port used successfully.
    pub port: Option<String>,
    /// Last baud rate used successfully.
    pub baud: Option<u32>,
}

impl Config {
    /// The platform config file location.
    fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "picoflash")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
        explicit.map(Path::to_path_buf).or_else(Self::default_path)
    }

    /// Load the config, falling back to defaults. An unreadable or
    /// invalid file is a warning, never fatal.
    pub fn load(explicit: Option<&Path>) -> Self {
        let Some(path) = Self::resolve_path(explicit) else {
            return Self::default();
        };
        let Ok(text) = fs::read_to_string(&path) else {
            return Self::default();
        };
        match toml::from_str(&text) {
            Ok(config) => {
                debug!("loaded config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("ignoring invalid TOML config {}: {e}", path.display());
                Self::default()
            },
        }
    }

    /// Write the config back to disk.
    pub fn save(&self, explicit: Option<&Path>) -> Result<()> {
        let Some(path) = Self::resolve_path(explicit) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let text = toml::to_string_pretty(self).context("serializing config")?;
        fs::write(&path, text).with_context(|| format!("writing {}", path.display()))
    }

    /// Record the port and baud rate that just worked.
    pub fn remember_port(&mut self, port: &str, baud: u32) {
        self.port = Some(port.to_string());
        self.baud = Some(baud);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.remember_port("/dev/ttyACM0", 115200);
        config.save(Some(&path)).expect("save");

        let loaded = Config::load(Some(&path));
        assert_eq!(loaded.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(loaded.baud, Some(115200));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = Config::load(Some(&dir.path().join("absent.toml")));
        assert!(loaded.port.is_none());
        assert!(loaded.baud.is_none());
    }

    #[test]
    fn test_invalid_toml_is_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "invalid toml [[[").expect("write");
        let loaded = Config::load(Some(&path));
        assert!(loaded.port.is_none());
    }
}
