//! CLI command implementations

pub mod scan;
pub mod watch;

use std::path::{Path, PathBuf};

use anyhow::Context;
use hotswap_plugins::hot_reload::{HotReloadConfig, LifecycleReport};
use tracing::warn;

/// Load the configuration file, if any, and apply the directory override.
pub fn resolve_config(path: Option<&Path>, dir: Option<PathBuf>) -> anyhow::Result<HotReloadConfig> {
    let mut config = match path {
        Some(path) => HotReloadConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => HotReloadConfig::default(),
    };
    if let Some(dir) = dir {
        config.directory = dir;
    }
    Ok(config)
}

/// Log every hook failure of a bulk transition.
pub fn log_report(phase: &str, report: &LifecycleReport) {
    for failure in &report.failures {
        warn!("{} phase: {}", phase, failure);
    }
}
