//! Hot reload configuration

use std::path::{Path, PathBuf};

use hotswap_kernel::config::{ConfigResult, load_with_env};
use serde::{Deserialize, Serialize};

/// Prefix for environment overrides, e.g. `HOTSWAP__DIRECTORY`.
pub const ENV_PREFIX: &str = "HOTSWAP";

/// Where modules live and how the native loader treats them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotReloadConfig {
    /// Directory scanned and watched for modules
    pub directory: PathBuf,
    /// Module file extension, without the dot
    pub extension: String,
    /// Extension of debug companions; empty or absent disables them
    pub debug_extension: Option<String>,
    /// Parent of the per-load shadow copies
    pub shadow_dir: PathBuf,
}

impl Default for HotReloadConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("plugins"),
            extension: std::env::consts::DLL_EXTENSION.to_string(),
            debug_extension: Some(default_debug_extension().to_string()),
            shadow_dir: std::env::temp_dir().join("hotswap-shadow"),
        }
    }
}

fn default_debug_extension() -> &'static str {
    if cfg!(windows) { "pdb" } else { "debug" }
}

impl HotReloadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML, YAML or JSON file with `HOTSWAP__*` overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        load_with_env(path, ENV_PREFIX)
    }

    pub fn with_directory<P: Into<PathBuf>>(mut self, directory: P) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn with_shadow_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.shadow_dir = dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults() {
        let config = HotReloadConfig::default();
        assert_eq!(config.directory, PathBuf::from("plugins"));
        assert_eq!(config.extension, std::env::consts::DLL_EXTENSION);
        assert_eq!(config.debug_extension.as_deref(), Some(default_debug_extension()));
        assert!(config.shadow_dir.ends_with("hotswap-shadow"));
    }

    #[test]
    fn test_from_file_fills_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hotswap.toml");
        fs::write(&path, "directory = \"mods\"\nextension = \"mod\"\n").unwrap();

        let config = HotReloadConfig::from_file(&path).unwrap();
        assert_eq!(config.directory, PathBuf::from("mods"));
        assert_eq!(config.extension, "mod");
        assert_eq!(config.shadow_dir, HotReloadConfig::default().shadow_dir);
    }

    #[test]
    fn test_from_file_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hotswap.json");
        fs::write(&path, r#"{ "debug_extension": "" , "shadow_dir": "/var/tmp/shadow" }"#).unwrap();

        let config = HotReloadConfig::from_file(&path).unwrap();
        assert_eq!(config.debug_extension.as_deref(), Some(""));
        assert_eq!(config.shadow_dir, PathBuf::from("/var/tmp/shadow"));
    }

    #[test]
    fn test_builders() {
        let config = HotReloadConfig::new()
            .with_directory("/opt/plugins")
            .with_extension(".so")
            .with_shadow_dir("/tmp/s");
        assert_eq!(config.directory, PathBuf::from("/opt/plugins"));
        assert_eq!(config.extension, "so");
        assert_eq!(config.shadow_dir, PathBuf::from("/tmp/s"));
    }
}
