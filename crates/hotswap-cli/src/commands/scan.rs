//! `hotswap scan` command implementation

use std::path::PathBuf;
use std::sync::Arc;

use comfy_table::{ContentArrangement, Table};
use hotswap_plugins::hot_reload::{
    DylibLoader, HotReloadConfig, LogSink, ModuleRegistry, ModuleSnapshot, PluginSnapshot,
};
use serde::Serialize;

use super::log_report;
use crate::console::Console;

/// Machine-readable scan result
#[derive(Debug, Serialize)]
struct ScanReport {
    directory: Option<PathBuf>,
    modules: Vec<ModuleSnapshot>,
    plugins: Vec<PluginSnapshot>,
    hook_failures: Vec<String>,
}

/// Load the directory once and print what it contains.
pub fn run(config: HotReloadConfig, json: bool) -> anyhow::Result<()> {
    // JSON output owns stdout; diagnostics still reach the log on stderr.
    let sink = if json {
        LogSink::discard()
    } else {
        Console::default().sink()
    };

    let loader = Arc::new(DylibLoader::from_config(&config));
    let registry = ModuleRegistry::without_watch(&config.directory, loader, sink);
    let loaded = registry.load_all();
    log_report("load", &loaded);

    let report = ScanReport {
        directory: registry.directory().map(|d| d.to_path_buf()),
        modules: registry.modules(),
        plugins: registry.plugins(),
        hook_failures: loaded.failures.iter().map(|f| f.to_string()).collect(),
    };
    registry.shutdown();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_tables(&report);
    }
    Ok(())
}

fn print_tables(report: &ScanReport) {
    if report.modules.is_empty() {
        println!("No modules found.");
        return;
    }

    let mut modules = Table::new();
    modules
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Module", "Status", "Plugins", "SHA-256"]);
    for module in &report.modules {
        let name = module
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let digest = module
            .digest
            .as_deref()
            .map(|d| d.chars().take(12).collect::<String>())
            .unwrap_or_else(|| "-".to_string());
        modules.add_row(vec![
            name,
            module.status.to_string(),
            module.plugins.to_string(),
            digest,
        ]);
    }
    println!("{modules}");

    if !report.plugins.is_empty() {
        let mut plugins = Table::new();
        plugins
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Plugin", "Module", "State", "Instance"]);
        for plugin in &report.plugins {
            plugins.add_row(vec![
                plugin.name.clone(),
                plugin.module.display().to_string(),
                plugin.state.to_string(),
                plugin.instance_id.to_string(),
            ]);
        }
        println!("{plugins}");
    }
}
