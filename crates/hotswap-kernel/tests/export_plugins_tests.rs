//! The entry points generated by `export_plugins!`

use hotswap_kernel::{PLUGIN_API_VERSION, Plugin, PluginRegistrar, PluginResult};

#[derive(Default)]
struct Greeter {
    greeted: bool,
}

impl Plugin for Greeter {
    fn on_load(&mut self) -> PluginResult<()> {
        Ok(())
    }

    fn on_enable(&mut self) -> PluginResult<()> {
        self.greeted = true;
        Ok(())
    }

    fn on_disable(&mut self) -> PluginResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct Farewell;

impl Plugin for Farewell {
    fn on_load(&mut self) -> PluginResult<()> {
        Ok(())
    }

    fn on_enable(&mut self) -> PluginResult<()> {
        Ok(())
    }

    fn on_disable(&mut self) -> PluginResult<()> {
        Ok(())
    }
}

hotswap_kernel::export_plugins!(Greeter, Farewell);

#[test]
fn test_exported_api_version() {
    assert_eq!(_hotswap_plugin_api_version(), PLUGIN_API_VERSION);
}

#[test]
fn test_exported_registration_lists_types_in_order() {
    let mut registrar = PluginRegistrar::new();
    _hotswap_register_plugins(&mut registrar);

    let names: Vec<_> = registrar.iter().map(|f| f.name()).collect();
    assert_eq!(names, vec!["Greeter", "Farewell"]);

    let mut plugin = registrar.get("Greeter").unwrap().construct().unwrap();
    assert_eq!(plugin.name(), "Greeter");
    plugin.on_enable().unwrap();
}
