//! Typed errors for the plugin contract.

use thiserror::Error;

/// Errors a plugin hook or constructor can report to its host.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PluginError {
    /// The plugin's load hook failed.
    #[error("Plugin load failed: {0}")]
    LoadFailed(String),

    /// The plugin's enable hook failed.
    #[error("Plugin enable failed: {0}")]
    EnableFailed(String),

    /// The plugin's disable hook failed.
    #[error("Plugin disable failed: {0}")]
    DisableFailed(String),

    /// A plugin type could not be constructed.
    #[error("Plugin construction failed: {0}")]
    ConstructionFailed(String),

    /// A hook or constructor panicked; the payload message is kept when it is a string.
    #[error("Plugin panicked: {0}")]
    Panicked(String),

    /// Plugin configuration is invalid or missing.
    #[error("Plugin configuration error: {0}")]
    ConfigError(String),

    /// An I/O error surfaced inside a hook.
    #[error("Plugin I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for errors that don't fit the above categories.
    #[error("{0}")]
    Other(String),
}

impl PluginError {
    /// Build a [`PluginError::Panicked`] from a `catch_unwind` payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }
}
