//! Template plugin module
//!
//! A starting point for native plugins. Build it with
//! `cargo build -p hotswap-template` and copy the resulting dynamic library
//! into the plugin directory a `hotswap` host is watching.
//!
//! Each hook prints one line naming itself. When `HOTSWAP_TEMPLATE_JOURNAL`
//! names a file, the same lines are appended to it.

use std::fs::OpenOptions;
use std::io::Write;

use hotswap_kernel::{Plugin, PluginResult};

/// Environment variable naming an optional journal file
pub const JOURNAL_ENV: &str = "HOTSWAP_TEMPLATE_JOURNAL";

#[derive(Default)]
pub struct TemplatePlugin;

impl TemplatePlugin {
    fn report(&self, hook: &str) -> PluginResult<()> {
        let line = format!("{}.{}", self.name(), hook);
        println!("{}", line);

        if let Some(path) = std::env::var_os(JOURNAL_ENV) {
            let mut journal = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(journal, "{}", line)?;
        }
        Ok(())
    }
}

impl Plugin for TemplatePlugin {
    fn on_load(&mut self) -> PluginResult<()> {
        self.report("OnLoad")
    }

    fn on_enable(&mut self) -> PluginResult<()> {
        self.report("OnEnable")
    }

    fn on_disable(&mut self) -> PluginResult<()> {
        self.report("OnDisable")
    }
}

hotswap_kernel::export_plugins!(TemplatePlugin);
