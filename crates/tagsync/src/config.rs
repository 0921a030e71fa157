//! Configuration for TagSync
//!
//! One `Config` value is resolved at startup and passed explicitly to every
//! operation. Paths live under the TagSync home (`TAGSYNC_HOME`, else
//! `~/.config/tagsync`).

use crate::attr::DEFAULT_ATTRIBUTE;
use crate::error::{Result, TagSyncError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Descriptor file that marks a directory's role.
pub const SENTINEL_FILE: &str = "tagsync.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    pub fn is_quiet(self) -> bool {
        self == Verbosity::Quiet
    }

    pub fn is_verbose(self) -> bool {
        self == Verbosity::Verbose
    }
}

/// Main configuration for TagSync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the manifest JSON file
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,

    /// Extended attribute that carries the tag
    #[serde(default = "default_attribute")]
    pub attribute_name: String,

    /// Name of the directory descriptor checked by the scanner
    #[serde(default = "default_sentinel_name")]
    pub sentinel_name: String,

    /// Read and write attributes through symlinks instead of on the link itself
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Report what would change without touching attributes or the manifest
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub verbosity: Verbosity,
}

fn default_manifest_path() -> PathBuf {
    tagsync_home().join("manifest.json")
}

fn default_attribute() -> String {
    DEFAULT_ATTRIBUTE.to_string()
}

fn default_sentinel_name() -> String {
    SENTINEL_FILE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manifest_path: default_manifest_path(),
            attribute_name: default_attribute(),
            sentinel_name: default_sentinel_name(),
            follow_symlinks: false,
            dry_run: false,
            verbosity: Verbosity::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| TagSyncError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Load `<home>/config.toml` if it exists, defaults otherwise.
    pub fn load_default() -> Result<Self> {
        let path = config_file_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| TagSyncError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Resolve the TagSync home directory.
///
/// Priority:
/// 1) TAGSYNC_HOME
/// 2) platform config dir (`~/.config/tagsync` on Linux)
/// 3) ./.tagsync
pub fn tagsync_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("TAGSYNC_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::config_dir()
        .map(|dir| dir.join("tagsync"))
        .unwrap_or_else(|| PathBuf::from(".").join(".tagsync"))
}

/// `<home>/config.toml`
pub fn config_file_path() -> PathBuf {
    tagsync_home().join("config.toml")
}

/// `<home>/logs`
pub fn logs_dir() -> PathBuf {
    tagsync_home().join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.manifest_path.ends_with("manifest.json"));
        assert_eq!(config.attribute_name, "user.backup_id");
        assert_eq!(config.sentinel_name, "tagsync.json");
        assert!(!config.dry_run);
        assert_eq!(config.verbosity, Verbosity::Normal);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            manifest_path = "/tmp/m.json"
            verbosity = "verbose"
            "#,
        )
        .unwrap();
        assert_eq!(config.manifest_path, PathBuf::from("/tmp/m.json"));
        assert_eq!(config.verbosity, Verbosity::Verbose);
        assert_eq!(config.attribute_name, "user.backup_id");
    }

    #[test]
    fn test_config_save_and_load() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        let config = Config {
            manifest_path: temp.path().join("manifest.json"),
            attribute_name: "user.other".to_string(),
            sentinel_name: SENTINEL_FILE.to_string(),
            follow_symlinks: true,
            dry_run: false,
            verbosity: Verbosity::Quiet,
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.manifest_path, config.manifest_path);
        assert_eq!(loaded.attribute_name, "user.other");
        assert!(loaded.follow_symlinks);
        assert_eq!(loaded.verbosity, Verbosity::Quiet);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "manifest_path = [").unwrap();
        assert!(matches!(Config::load(&path), Err(TagSyncError::Config(_))));
    }

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(true, false), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
    }
}
