//! hotswap kernel
//!
//! The contract shared between a plugin host and the modules it loads:
//!
//! - [`plugin::Plugin`]: the load/enable/disable hooks every plugin implements
//! - [`plugin::PluginRegistrar`]: the registration table a module fills in
//! - [`export_plugins!`]: exports a module's registration entry points
//!
//! Plugin crates depend on this crate alone. The `config` feature adds the
//! multi-format configuration loader used by hosts.

pub mod plugin;

#[cfg(feature = "config")]
pub mod config;

pub use plugin::{
    PLUGIN_API_VERSION, Plugin, PluginError, PluginFactory, PluginRegistrar, PluginResult,
};
