// SPDX-License-Identifier: MIT
//
// Bridge configuration: a small JSON file in the platform data directory.
// No hot reload — the bridge reads it once at startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

/// Default loopback port the bridge listens on.
pub const DEFAULT_PORT: u16 = 9632;

/// How many days of rolling log files to keep.
pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 7;

/// Persistent bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    /// TCP port bound on 127.0.0.1.
    pub port: u16,
    /// Preferred printer when a request names none. Overrides the OS
    /// default during routing.
    pub default_printer_name: Option<String>,
    /// Browser origins allowed to call the bridge. The kiosk runs from
    /// these local origins only; anything else gets no CORS headers.
    pub allowed_origins: Vec<String>,
    /// Days of daily log files retained before startup pruning.
    pub log_retention_days: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            default_printer_name: None,
            allowed_origins: vec![
                "http://localhost:3000".into(),
                "http://localhost:5173".into(),
                "http://127.0.0.1:3000".into(),
                "http://127.0.0.1:5173".into(),
            ],
            log_retention_days: DEFAULT_LOG_RETENTION_DAYS,
        }
    }
}

impl BridgeConfig {
    /// Load the config from `dir/config.json`, falling back to defaults if
    /// the file is missing or unreadable. A broken config file should never
    /// keep the kiosk from printing.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join("config.json");
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded bridge config");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "config file unparsable — using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "no config file — using defaults");
                Self::default()
            }
        }
    }

    /// Write the config to `dir/config.json` as pretty-printed JSON.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("config.json");
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        info!(path = %path.display(), "saved bridge config");
        Ok(())
    }

    /// Whether `origin` is on the CORS allow-list (exact match, trailing
    /// slashes stripped).
    pub fn origin_allowed(&self, origin: &str) -> bool {
        let origin = origin.trim_end_matches('/');
        self.allowed_origins
            .iter()
            .any(|allowed| allowed.trim_end_matches('/') == origin)
    }
}

/// Return the bridge data directory, creating it if needed.
pub fn data_dir() -> PathBuf {
    let dir = base_dir().join("koinon-bridge");
    std::fs::create_dir_all(&dir).ok();
    dir
}

fn base_dir() -> PathBuf {
    // Windows first (the bridge's production platform), then XDG, then home.
    if let Ok(appdata) = std::env::var("LOCALAPPDATA") {
        return PathBuf::from(appdata);
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from("/tmp")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_loopback_dev_origins() {
        let config = BridgeConfig::default();
        assert_eq!(config.port, 9632);
        assert!(config.origin_allowed("http://localhost:5173"));
        assert!(!config.origin_allowed("http://evil.example.com"));
    }

    #[test]
    fn origin_match_ignores_trailing_slash() {
        let config = BridgeConfig::default();
        assert!(config.origin_allowed("http://localhost:3000/"));
    }

    #[test]
    fn round_trips_through_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BridgeConfig::default();
        config.port = 9700;
        config.default_printer_name = Some("Zebra ZD410".into());
        config.save(dir.path()).unwrap();

        let loaded = BridgeConfig::load(dir.path());
        assert_eq!(loaded.port, 9700);
        assert_eq!(loaded.default_printer_name.as_deref(), Some("Zebra ZD410"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BridgeConfig::load(dir.path());
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn unparsable_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "{not json").unwrap();
        let config = BridgeConfig::load(dir.path());
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let json = r#"{"port": 9999, "futureKnob": true}"#;
        let config: BridgeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.port, 9999);
        assert_eq!(config.log_retention_days, DEFAULT_LOG_RETENTION_DAYS);
    }
}
