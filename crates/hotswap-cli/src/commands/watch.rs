//! `hotswap watch` command implementation

use std::sync::Arc;

use hotswap_plugins::hot_reload::{DylibLoader, HotReloadConfig, ModuleRegistry};
use tracing::info;

use super::log_report;
use crate::console::Console;

/// Run the registry until Ctrl-C.
pub async fn run(config: HotReloadConfig, enable: bool) -> anyhow::Result<()> {
    let console = Console::default();
    let loader = Arc::new(DylibLoader::from_config(&config));
    let registry = ModuleRegistry::new(&config.directory, loader, console.sink());

    log_report("load", &registry.load_all());
    if enable {
        log_report("enable", &registry.enable_all());
    }

    info!(
        "{} plugin(s) loaded, {} enabled",
        registry.loaded_plugins().len(),
        registry.enabled_plugins().len()
    );
    if registry.is_watching() {
        console.print("Watching for module changes. Press Ctrl-C to stop.");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    log_report("disable", &registry.disable_all());
    log_report("shutdown", &registry.shutdown());
    Ok(())
}
