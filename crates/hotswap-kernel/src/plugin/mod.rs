//! Plugin capability contract
//!
//! A module exposes any number of plugin types. It does so through a
//! registration table: the host hands the module a [`PluginRegistrar`] and the
//! module records one [`PluginFactory`] per plugin type. The host then builds
//! instances from those factories and drives their hooks.

use std::any::type_name;
use std::fmt;

pub mod error;
pub use error::PluginError;

/// Result type for plugin hooks and constructors.
pub type PluginResult<T> = Result<T, PluginError>;

/// Version of the module ABI exported by [`export_plugins!`].
///
/// A module built against a different version is refused by the host.
pub const PLUGIN_API_VERSION: u32 = 1;

/// Symbol a module exports to report its [`PLUGIN_API_VERSION`].
pub const API_VERSION_SYMBOL: &[u8] = b"_hotswap_plugin_api_version";

/// Symbol a module exports to fill in a [`PluginRegistrar`].
pub const REGISTER_SYMBOL: &[u8] = b"_hotswap_register_plugins";

/// Signature of the function behind [`REGISTER_SYMBOL`].
///
/// This uses the Rust ABI: host and module must be built by the same compiler.
pub type RegisterFn = fn(&mut PluginRegistrar);

/// The hooks a host drives on every plugin instance.
///
/// The host guarantees each hook runs at most once per logical transition:
/// `on_load` once, then `on_enable`/`on_disable` alternating. There is no
/// unload hook; an instance is dropped when its module is replaced.
pub trait Plugin: Send {
    /// Name used in diagnostics. Defaults to the unqualified type name.
    fn name(&self) -> &str {
        short_type_name(type_name::<Self>())
    }

    /// Allocate whatever the plugin needs. Runs once, before `on_enable`.
    fn on_load(&mut self) -> PluginResult<()>;

    /// Start reacting to the host.
    fn on_enable(&mut self) -> PluginResult<()>;

    /// Stop reacting to the host. The instance may be enabled again later.
    fn on_disable(&mut self) -> PluginResult<()>;
}

type Constructor = dyn Fn() -> PluginResult<Box<dyn Plugin>> + Send + Sync;

/// Named constructor for one plugin type.
pub struct PluginFactory {
    name: String,
    constructor: Box<Constructor>,
}

impl PluginFactory {
    pub fn new<F>(name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> PluginResult<Box<dyn Plugin>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            constructor: Box::new(constructor),
        }
    }

    /// Factory for a `Default`-constructible plugin type, named after the type.
    pub fn of<T>() -> Self
    where
        T: Plugin + Default + 'static,
    {
        Self::new(short_type_name(type_name::<T>()), || {
            Ok(Box::new(T::default()) as Box<dyn Plugin>)
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build a fresh instance. Panics are not caught here; callers that must
    /// survive a misbehaving constructor wrap this in `catch_unwind`.
    pub fn construct(&self) -> PluginResult<Box<dyn Plugin>> {
        (self.constructor)()
    }
}

impl fmt::Debug for PluginFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginFactory")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Ordered table of plugin factories discovered in one module.
#[derive(Debug, Default)]
pub struct PluginRegistrar {
    factories: Vec<PluginFactory>,
}

impl PluginRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a `Default`-constructible plugin type.
    pub fn register<T>(&mut self) -> &mut Self
    where
        T: Plugin + Default + 'static,
    {
        self.factories.push(PluginFactory::of::<T>());
        self
    }

    /// Register a named constructor, for plugins that can fail to build.
    pub fn register_with<F>(&mut self, name: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn() -> PluginResult<Box<dyn Plugin>> + Send + Sync + 'static,
    {
        self.factories.push(PluginFactory::new(name, constructor));
        self
    }

    /// First factory registered under `name`.
    pub fn get(&self, name: &str) -> Option<&PluginFactory> {
        self.factories.iter().find(|f| f.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginFactory> {
        self.factories.iter()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn into_factories(self) -> Vec<PluginFactory> {
        self.factories
    }
}

/// Strip the module path from a `type_name` result, keeping generic arguments intact.
pub fn short_type_name(full: &str) -> &str {
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

/// Export the registration entry points of a plugin module.
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct Greeter;
///
/// impl hotswap_kernel::Plugin for Greeter { /* hooks */ }
///
/// hotswap_kernel::export_plugins!(Greeter);
/// ```
#[macro_export]
macro_rules! export_plugins {
    ($($plugin:ty),+ $(,)?) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn _hotswap_plugin_api_version() -> u32 {
            $crate::plugin::PLUGIN_API_VERSION
        }

        #[unsafe(no_mangle)]
        pub fn _hotswap_register_plugins(registrar: &mut $crate::plugin::PluginRegistrar) {
            $( registrar.register::<$plugin>(); )+
        }
    };
}
