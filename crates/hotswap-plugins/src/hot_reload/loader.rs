//! Module loading
//!
//! A [`ModuleLoader`] turns one module file into the plugin instances it
//! exposes. [`DylibLoader`] loads native dynamic libraries that export their
//! plugins with [`hotswap_kernel::export_plugins!`].

use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hotswap_kernel::plugin::{API_VERSION_SYMBOL, REGISTER_SYMBOL, RegisterFn};
use hotswap_kernel::{PLUGIN_API_VERSION, Plugin, PluginError, PluginFactory, PluginRegistrar, PluginResult};
use libloading::{Library, Symbol};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::config::HotReloadConfig;
use super::sink::LogSink;

/// Module load error types
#[derive(Debug, thiserror::Error)]
pub enum ModuleLoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to load library: {0}")]
    LibraryLoad(String),

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("API version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("Invalid module: {0}")]
    InvalidModule(String),

    #[error("Module registration panicked: {0}")]
    RegistrationPanicked(String),
}

/// Turns a module file into plugin instances.
///
/// Implementations report a hard error only when the module as a whole
/// cannot be loaded. A plugin type that fails to construct is logged to the
/// sink and skipped; see [`instantiate`].
pub trait ModuleLoader: Send + Sync {
    /// Extension of module files, without the leading dot.
    fn extension(&self) -> &str;

    /// Whether `path` carries this loader's module extension.
    fn is_module(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(self.extension())
    }

    /// Load the module at `path` and build one instance per plugin type, in
    /// discovery order.
    fn load(&self, path: &Path, sink: &LogSink) -> Result<Vec<Box<dyn Plugin>>, ModuleLoadError>;
}

/// Build one instance per factory, skipping (and logging) every factory whose
/// constructor fails or panics.
pub fn instantiate<'a, I>(factories: I, sink: &LogSink) -> Vec<Box<dyn Plugin>>
where
    I: IntoIterator<Item = &'a PluginFactory>,
{
    let mut plugins = Vec::new();
    for factory in factories {
        let built = catch_unwind(AssertUnwindSafe(|| factory.construct()))
            .unwrap_or_else(|payload| Err(PluginError::from_panic(payload)));
        match built {
            Ok(plugin) => {
                debug!("Instantiated plugin type {}", factory.name());
                plugins.push(plugin);
            }
            Err(e) => {
                sink.write_line(format!("Failed to instantiate type: {} ({})", factory.name(), e));
            }
        }
    }
    plugins
}

/// SHA-256 of a file's contents, hex encoded
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let contents = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&contents);
    Ok(format!("{:x}", hasher.finalize()))
}

/// A loaded library and the shadow directory its copy lives in.
///
/// Field order matters: the library is closed before the copy is deleted.
struct ModuleLibrary {
    library: Library,
    path: PathBuf,
    _shadow: TempDir,
}

impl Drop for ModuleLibrary {
    fn drop(&mut self) {
        debug!("Unloading module library: {:?}", self.path);
    }
}

/// A plugin instance that keeps its library mapped for as long as it lives.
struct LibraryPlugin {
    plugin: Box<dyn Plugin>,
    _library: Arc<ModuleLibrary>,
}

impl Plugin for LibraryPlugin {
    fn name(&self) -> &str {
        self.plugin.name()
    }

    fn on_load(&mut self) -> PluginResult<()> {
        self.plugin.on_load()
    }

    fn on_enable(&mut self) -> PluginResult<()> {
        self.plugin.on_enable()
    }

    fn on_disable(&mut self) -> PluginResult<()> {
        self.plugin.on_disable()
    }
}

/// Loads native dynamic libraries.
///
/// Each load copies the module (and its debug companion, when present) into a
/// fresh shadow directory and opens the copy. The original file is never held
/// open, so it can be rewritten while plugins from it run, and every reload
/// maps new code rather than the platform's cached handle for the old path.
#[derive(Debug, Clone)]
pub struct DylibLoader {
    extension: String,
    debug_extension: Option<String>,
    shadow_dir: PathBuf,
    api_version: u32,
}

impl DylibLoader {
    pub fn new() -> Self {
        Self::from_config(&HotReloadConfig::default())
    }

    pub fn from_config(config: &HotReloadConfig) -> Self {
        Self {
            extension: config.extension.clone(),
            debug_extension: config.debug_extension.clone().filter(|e| !e.is_empty()),
            shadow_dir: config.shadow_dir.clone(),
            api_version: PLUGIN_API_VERSION,
        }
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn with_debug_extension(mut self, extension: Option<&str>) -> Self {
        self.debug_extension = extension
            .map(|e| e.trim_start_matches('.').to_string())
            .filter(|e| !e.is_empty());
        self
    }

    pub fn with_shadow_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.shadow_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn shadow_dir(&self) -> &Path {
        &self.shadow_dir
    }

    /// Debug data co-located with `module`: same base name, debug extension.
    pub fn debug_companion(&self, module: &Path) -> Option<PathBuf> {
        let ext = self.debug_extension.as_deref()?;
        let candidate = module.with_extension(ext);
        (candidate != module && candidate.is_file()).then_some(candidate)
    }

    /// Copy the module and its debug companion into a new shadow directory.
    fn shadow_copy(&self, path: &Path, sink: &LogSink) -> Result<(TempDir, PathBuf), ModuleLoadError> {
        let file_name = path
            .file_name()
            .ok_or_else(|| ModuleLoadError::InvalidModule(format!("{:?} has no file name", path)))?;

        fs::create_dir_all(&self.shadow_dir)?;
        let shadow = tempfile::Builder::new()
            .prefix("module-")
            .tempdir_in(&self.shadow_dir)?;

        let copy = shadow.path().join(file_name);
        fs::copy(path, &copy)?;

        if let Some(debug_path) = self.debug_companion(path) {
            let target = shadow.path().join(debug_path.file_name().unwrap_or_default());
            match fs::copy(&debug_path, target) {
                Ok(_) => sink.write_line(format!("Loaded debug symbols: {}", debug_path.display())),
                Err(e) => warn!("Skipping debug symbols {:?}: {}", debug_path, e),
            }
        }

        Ok((shadow, copy))
    }
}

impl Default for DylibLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleLoader for DylibLoader {
    fn extension(&self) -> &str {
        &self.extension
    }

    fn load(&self, path: &Path, sink: &LogSink) -> Result<Vec<Box<dyn Plugin>>, ModuleLoadError> {
        let (shadow, copy) = self.shadow_copy(path, sink)?;

        // SAFETY: loading a library runs its initializers. Modules in the
        // plugin directory are trusted code.
        let library = unsafe { Library::new(&copy) }
            .map_err(|e| ModuleLoadError::LibraryLoad(e.to_string()))?;

        let api_version = unsafe {
            let version_fn: Result<Symbol<unsafe extern "C" fn() -> u32>, _> =
                library.get(API_VERSION_SYMBOL);
            match version_fn {
                Ok(func) => func(),
                Err(_) => 1, // Default to version 1 if not specified
            }
        };
        if api_version != self.api_version {
            return Err(ModuleLoadError::VersionMismatch {
                expected: self.api_version,
                actual: api_version,
            });
        }

        let register: RegisterFn = unsafe {
            let symbol: Symbol<RegisterFn> = library.get(REGISTER_SYMBOL).map_err(|e| {
                ModuleLoadError::SymbolNotFound(format!(
                    "{}: {}",
                    String::from_utf8_lossy(REGISTER_SYMBOL),
                    e
                ))
            })?;
            *symbol
        };

        let module = Arc::new(ModuleLibrary {
            library,
            path: path.to_path_buf(),
            _shadow: shadow,
        });

        // The registrar holds closures that live in the library; it must be
        // dropped while `module` is still alive.
        let mut registrar = PluginRegistrar::new();
        catch_unwind(AssertUnwindSafe(|| register(&mut registrar))).map_err(|payload| {
            ModuleLoadError::RegistrationPanicked(PluginError::from_panic(payload).to_string())
        })?;

        let plugins = instantiate(registrar.iter(), sink);
        info!(
            "Loaded module {:?}: {} of {} plugin type(s) instantiated",
            path,
            plugins.len(),
            registrar.len()
        );
        drop(registrar);

        Ok(plugins
            .into_iter()
            .map(|plugin| {
                Box::new(LibraryPlugin {
                    plugin,
                    _library: module.clone(),
                }) as Box<dyn Plugin>
            })
            .collect())
    }
}
