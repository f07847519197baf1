//! Plugin hosting
//!
//! Keeps a set of running plugin instances in step with a directory of
//! loadable modules, see [`hot_reload`].

pub mod hot_reload;

pub use hotswap_kernel::{Plugin, PluginError, PluginFactory, PluginRegistrar, PluginResult};
