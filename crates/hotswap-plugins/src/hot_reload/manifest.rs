//! Registration-table modules
//!
//! A manifest module is a TOML file naming plugin types that the host
//! registered in-process:
//!
//! ```toml
//! plugins = ["Greeter", "Counter"]
//! ```

use std::fs;
use std::path::Path;

use hotswap_kernel::{Plugin, PluginError, PluginFactory, PluginRegistrar};
use serde::Deserialize;
use tracing::debug;

use super::loader::{ModuleLoadError, ModuleLoader, instantiate};
use super::sink::LogSink;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Manifest {
    plugins: Vec<String>,
}

/// Loads manifest modules against a host-side [`PluginRegistrar`].
pub struct ManifestLoader {
    extension: String,
    registrar: PluginRegistrar,
}

impl ManifestLoader {
    pub fn new(extension: &str, registrar: PluginRegistrar) -> Self {
        Self {
            extension: extension.trim_start_matches('.').to_string(),
            registrar,
        }
    }

    pub fn registrar(&self) -> &PluginRegistrar {
        &self.registrar
    }
}

impl ModuleLoader for ManifestLoader {
    fn extension(&self) -> &str {
        &self.extension
    }

    fn load(&self, path: &Path, sink: &LogSink) -> Result<Vec<Box<dyn Plugin>>, ModuleLoadError> {
        let text = fs::read_to_string(path)?;
        let manifest: Manifest = toml::from_str(&text)
            .map_err(|e| ModuleLoadError::InvalidModule(format!("{}: {}", path.display(), e)))?;
        debug!("Manifest {:?} names {} plugin type(s)", path, manifest.plugins.len());

        let unknown: Vec<PluginFactory> = manifest
            .plugins
            .iter()
            .filter(|name| self.registrar.get(name).is_none())
            .map(|name| {
                let name = name.clone();
                let message = format!("no plugin type registered as '{}'", name);
                PluginFactory::new(name, move || Err(PluginError::ConstructionFailed(message.clone())))
            })
            .collect();

        // Keep manifest order; unknown names become failing factories so they
        // are reported the same way as a constructor that fails.
        let mut unknown = unknown.iter();
        let factories = manifest.plugins.iter().filter_map(|name| match self.registrar.get(name) {
            Some(factory) => Some(factory),
            None => unknown.next(),
        });

        Ok(instantiate(factories, sink))
    }
}
