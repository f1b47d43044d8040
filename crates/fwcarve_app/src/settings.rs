//! Settings file and on-disk layout.

use anyhow::{Context, Result};
use fwcarve_core::LocatorConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_FIRMWARE: &str = "digicap.dav";
pub const DEFAULT_PAYLOAD: &str = "ai_model/traffic_signs.bin";
pub const DEFAULT_REBUILT: &str = "firmware_output/digicap_modified.dav";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub locator: LocatorSettings,
    pub paths: PathSettings,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        serde_json::from_slice(&raw)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocatorSettings {
    pub window_size: usize,
    pub density_threshold: f64,
    pub min_run_size: u64,
}

impl Default for LocatorSettings {
    fn default() -> Self {
        let config = LocatorConfig::default();
        Self {
            window_size: config.window_size,
            density_threshold: config.density_threshold,
            min_run_size: config.min_run_size,
        }
    }
}

impl From<&LocatorSettings> for LocatorConfig {
    fn from(s: &LocatorSettings) -> Self {
        Self {
            window_size: s.window_size,
            density_threshold: s.density_threshold,
            min_run_size: s.min_run_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathSettings {
    pub firmware: PathBuf,
    pub payload: PathBuf,
    pub rebuilt: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            firmware: PathBuf::from(DEFAULT_FIRMWARE),
            payload: PathBuf::from(DEFAULT_PAYLOAD),
            rebuilt: PathBuf::from(DEFAULT_REBUILT),
        }
    }
}

/// Resolved file locations for one invocation.
///
/// Nothing is cached here: every step looks at the files on disk afresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub firmware: PathBuf,
    pub payload: PathBuf,
    pub rebuilt: PathBuf,
}

impl Workspace {
    pub fn resolve(base: &Path, paths: &PathSettings) -> Self {
        Self {
            firmware: base.join(&paths.firmware),
            payload: base.join(&paths.payload),
            rebuilt: base.join(&paths.rebuilt),
        }
    }

    /// Manifest written next to the payload side file.
    pub fn manifest(&self) -> PathBuf {
        let mut name = self.payload.as_os_str().to_owned();
        name.push(".json");
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_locator() {
        let settings = Settings::default();
        assert_eq!(LocatorConfig::from(&settings.locator), LocatorConfig::default());
        assert_eq!(settings.paths.firmware, PathBuf::from("digicap.dav"));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "locator": { "min_run_size": 4096 } }"#).unwrap();
        assert_eq!(settings.locator.min_run_size, 4096);
        assert_eq!(settings.locator.window_size, 1024 * 1024);
        assert_eq!(settings.paths, PathSettings::default());
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let result: serde_json::Result<Settings> =
            serde_json::from_str(r#"{ "locator": { "window": 1 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_workspace_paths() {
        let ws = Workspace::resolve(Path::new("/work"), &PathSettings::default());
        assert_eq!(ws.firmware, PathBuf::from("/work/digicap.dav"));
        assert_eq!(
            ws.manifest(),
            PathBuf::from("/work/ai_model/traffic_signs.bin.json")
        );
        assert_eq!(
            ws.rebuilt,
            PathBuf::from("/work/firmware_output/digicap_modified.dav")
        );
    }
}
