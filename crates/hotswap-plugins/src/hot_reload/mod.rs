//! Hot-reload plugin support module
//!
//! Keeps plugin instances synchronized with a directory of modules:
//! - File watching, coalesced into added/removed events
//! - Module loading through a pluggable [`ModuleLoader`]
//! - Idempotent load/enable/disable transitions per plugin
//! - Whole-module replacement when a module file changes

mod config;
mod loader;
mod manifest;
mod registry;
mod sink;
mod state;
mod watcher;

pub use config::HotReloadConfig;
pub use loader::{DylibLoader, ModuleLoadError, ModuleLoader, instantiate, sha256_file};
pub use manifest::ManifestLoader;
pub use registry::{
    LifecycleReport, ModuleRegistry, ModuleSnapshot, ModuleSource, ModuleStatus, PluginSnapshot,
};
pub use sink::LogSink;
pub use state::{Hook, HookFailure, LifecycleUnit, UnitState};
pub use watcher::{ChangeCoalescer, ModuleEvent, RawChange, WatchError};
