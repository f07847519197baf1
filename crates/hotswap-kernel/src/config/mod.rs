//! Configuration loading
//!
//! Hosts describe their plugin directory and loader settings in a TOML, YAML
//! or JSON file. The format follows the file extension, `${VAR}` references
//! are substituted from the environment before parsing, and values can be
//! overridden with prefixed environment variables (`PREFIX__FIELD`).

use config::{Config as Cfg, Environment, File, FileFormat};
use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::OnceLock;

/// Configuration loading error
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Detect the configuration format from a file extension.
///
/// Accepts `.toml`, `.yaml`/`.yml` and `.json`.
pub fn detect_format(path: &Path) -> ConfigResult<FileFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_ascii_lowercase().as_str() {
        "toml" => Ok(FileFormat::Toml),
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "json" => Ok(FileFormat::Json),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

fn env_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static pattern is valid")
    })
}

/// Replace every `${VAR}` with the value of `VAR`.
///
/// Unset variables are left untouched so the parser reports them in context.
pub fn substitute_env_vars(content: &str) -> String {
    env_reference()
        .replace_all(content, |caps: &Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Parse configuration text of a known format.
pub fn from_str<T>(content: &str, format: FileFormat) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    build(Cfg::builder().add_source(File::from_str(&substitute_env_vars(content), format)))
}

/// Load a configuration file, detecting its format from the extension.
pub fn load_config<T>(path: impl AsRef<Path>) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let path = path.as_ref();
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    tracing::debug!("Loading configuration from {:?}", path);
    from_str(&content, format)
}

/// Load a configuration file, then apply `PREFIX__FIELD` environment overrides.
///
/// Nested fields use a double underscore: `HOTSWAP__SHADOW_DIR` overrides
/// `shadow_dir` when the prefix is `HOTSWAP`.
pub fn load_with_env<T>(path: impl AsRef<Path>, env_prefix: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let path = path.as_ref();
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    build(
        Cfg::builder()
            .add_source(File::from_str(&substitute_env_vars(&content), format))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__"),
            ),
    )
}

fn build<T>(builder: config::ConfigBuilder<config::builder::DefaultState>) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    builder
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?
        .try_deserialize()
        .map_err(|e| ConfigError::Deserialize(e.to_string()))
}

#[cfg(test)]
mod tests;
