//! Plugin lifecycle state
//!
//! A [`LifecycleUnit`] wraps one plugin instance and guarantees each of its
//! hooks runs at most once per logical transition, however many times the
//! host or the reload machinery asks for it.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};

use hotswap_kernel::{Plugin, PluginError};
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Lifecycle state of one plugin instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    /// Constructed, load hook not run yet
    #[default]
    Unloaded,
    /// Load hook has run
    Loaded,
    /// Loaded and enabled
    Enabled,
}

impl UnitState {
    pub fn is_loaded(self) -> bool {
        matches!(self, UnitState::Loaded | UnitState::Enabled)
    }

    pub fn is_enabled(self) -> bool {
        self == UnitState::Enabled
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitState::Unloaded => write!(f, "Unloaded"),
            UnitState::Loaded => write!(f, "Loaded"),
            UnitState::Enabled => write!(f, "Enabled"),
        }
    }
}

/// Plugin hook identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Load,
    Enable,
    Disable,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Load => write!(f, "load"),
            Hook::Enable => write!(f, "enable"),
            Hook::Disable => write!(f, "disable"),
        }
    }
}

/// A plugin hook that returned an error or panicked
#[derive(Debug, thiserror::Error)]
#[error("{hook} hook of plugin {plugin} ({module:?}) failed: {source}")]
pub struct HookFailure {
    /// Module the plugin came from
    pub module: PathBuf,
    /// Plugin name
    pub plugin: String,
    /// Unit instance ID
    pub instance_id: Uuid,
    /// Hook that failed
    pub hook: Hook,
    #[source]
    pub source: PluginError,
}

struct UnitInner {
    state: UnitState,
    /// Set once the owning module entry has been reconciled away
    retired: bool,
    plugin: Box<dyn Plugin>,
}

/// One plugin instance plus its lifecycle state.
///
/// Transitions are serialized per unit. State only advances when a hook
/// succeeds; a failing hook leaves the unit where it was.
pub struct LifecycleUnit {
    instance_id: Uuid,
    name: String,
    module: PathBuf,
    inner: Mutex<UnitInner>,
}

impl LifecycleUnit {
    pub fn new(plugin: Box<dyn Plugin>, module: impl Into<PathBuf>) -> Self {
        Self {
            instance_id: Uuid::now_v7(),
            name: plugin.name().to_string(),
            module: module.into(),
            inner: Mutex::new(UnitInner {
                state: UnitState::Unloaded,
                retired: false,
                plugin,
            }),
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &Path {
        &self.module
    }

    pub fn state(&self) -> UnitState {
        self.inner.lock().state
    }

    pub fn is_loaded(&self) -> bool {
        self.state().is_loaded()
    }

    pub fn is_enabled(&self) -> bool {
        self.state().is_enabled()
    }

    pub fn is_retired(&self) -> bool {
        self.inner.lock().retired
    }

    /// Run the load hook unless it already ran.
    pub fn load(&self) -> Result<(), HookFailure> {
        let mut inner = self.inner.lock();
        if inner.retired || inner.state != UnitState::Unloaded {
            return Ok(());
        }
        self.run(&mut inner, Hook::Load)?;
        inner.state = UnitState::Loaded;
        Ok(())
    }

    /// Run the enable hook unless the unit is already enabled.
    ///
    /// An unloaded unit is left alone: enabling never implies loading.
    pub fn enable(&self) -> Result<(), HookFailure> {
        let mut inner = self.inner.lock();
        if inner.retired || inner.state != UnitState::Loaded {
            if inner.state == UnitState::Unloaded {
                debug!("Skipping enable of unloaded plugin {}", self.name);
            }
            return Ok(());
        }
        self.run(&mut inner, Hook::Enable)?;
        inner.state = UnitState::Enabled;
        Ok(())
    }

    /// Run the disable hook if the unit is enabled; it goes back to `Loaded`.
    pub fn disable(&self) -> Result<(), HookFailure> {
        let mut inner = self.inner.lock();
        if inner.retired {
            return Ok(());
        }
        self.disable_locked(&mut inner)
    }

    /// Disable the unit if needed and refuse every later transition.
    ///
    /// The unit is retired even when its disable hook fails.
    pub fn retire(&self) -> Result<(), HookFailure> {
        let mut inner = self.inner.lock();
        if inner.retired {
            return Ok(());
        }
        let result = self.disable_locked(&mut inner);
        inner.retired = true;
        result
    }

    /// Give the caller the plugin instance while the unit's lock is held.
    pub fn with_plugin<R>(&self, f: impl FnOnce(&mut dyn Plugin) -> R) -> R {
        let mut inner = self.inner.lock();
        f(inner.plugin.as_mut())
    }

    fn disable_locked(&self, inner: &mut UnitInner) -> Result<(), HookFailure> {
        if inner.state != UnitState::Enabled {
            return Ok(());
        }
        self.run(inner, Hook::Disable)?;
        inner.state = UnitState::Loaded;
        Ok(())
    }

    fn run(&self, inner: &mut UnitInner, hook: Hook) -> Result<(), HookFailure> {
        debug!("Running {} hook of plugin {} ({})", hook, self.name, self.instance_id);

        let plugin = &mut inner.plugin;
        let result = catch_unwind(AssertUnwindSafe(|| match hook {
            Hook::Load => plugin.on_load(),
            Hook::Enable => plugin.on_enable(),
            Hook::Disable => plugin.on_disable(),
        }))
        .unwrap_or_else(|payload| Err(PluginError::from_panic(payload)));

        result.map_err(|source| {
            warn!("Plugin {} {} hook failed: {}", self.name, hook, source);
            HookFailure {
                module: self.module.clone(),
                plugin: self.name.clone(),
                instance_id: self.instance_id,
                hook,
                source,
            }
        })
    }
}

impl fmt::Debug for LifecycleUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("LifecycleUnit")
            .field("instance_id", &self.instance_id)
            .field("name", &self.name)
            .field("module", &self.module)
            .field("state", &inner.state)
            .field("retired", &inner.retired)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotswap_kernel::PluginResult;
    use std::sync::Arc;

    /// Records every hook invocation; each hook can be told to fail.
    #[derive(Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<&'static str>>>,
        fail_load: bool,
        fail_enable: bool,
        panic_disable: bool,
    }

    impl Plugin for Recorder {
        fn on_load(&mut self) -> PluginResult<()> {
            self.calls.lock().push("load");
            if self.fail_load {
                return Err(PluginError::LoadFailed("no resources".to_string()));
            }
            Ok(())
        }

        fn on_enable(&mut self) -> PluginResult<()> {
            self.calls.lock().push("enable");
            if self.fail_enable {
                return Err(PluginError::EnableFailed("refused".to_string()));
            }
            Ok(())
        }

        fn on_disable(&mut self) -> PluginResult<()> {
            self.calls.lock().push("disable");
            if self.panic_disable {
                panic!("disable exploded");
            }
            Ok(())
        }
    }

    fn unit(recorder: Recorder) -> (LifecycleUnit, Arc<Mutex<Vec<&'static str>>>) {
        let calls = recorder.calls.clone();
        (LifecycleUnit::new(Box::new(recorder), "/plugins/recorder.so"), calls)
    }

    #[test]
    fn test_unit_state_display() {
        assert_eq!(UnitState::Unloaded.to_string(), "Unloaded");
        assert_eq!(UnitState::Loaded.to_string(), "Loaded");
        assert_eq!(UnitState::Enabled.to_string(), "Enabled");
        assert!(UnitState::Enabled.is_loaded());
        assert!(!UnitState::Loaded.is_enabled());
    }

    #[test]
    fn test_full_lifecycle() {
        let (unit, calls) = unit(Recorder::default());
        assert_eq!(unit.state(), UnitState::Unloaded);
        assert_eq!(unit.name(), "Recorder");
        assert_eq!(unit.module(), Path::new("/plugins/recorder.so"));

        unit.load().unwrap();
        assert_eq!(unit.state(), UnitState::Loaded);
        unit.enable().unwrap();
        assert_eq!(unit.state(), UnitState::Enabled);
        unit.disable().unwrap();
        assert_eq!(unit.state(), UnitState::Loaded);
        unit.enable().unwrap();

        assert_eq!(*calls.lock(), vec!["load", "enable", "disable", "enable"]);
    }

    #[test]
    fn test_repeated_transitions_are_noops() {
        let (unit, calls) = unit(Recorder::default());

        unit.load().unwrap();
        unit.load().unwrap();
        unit.enable().unwrap();
        unit.enable().unwrap();
        unit.disable().unwrap();
        unit.disable().unwrap();

        assert_eq!(*calls.lock(), vec!["load", "enable", "disable"]);
    }

    #[test]
    fn test_disable_never_enabled_runs_no_hook() {
        let (unit, calls) = unit(Recorder::default());
        unit.disable().unwrap();
        unit.load().unwrap();
        unit.disable().unwrap();

        assert_eq!(*calls.lock(), vec!["load"]);
        assert_eq!(unit.state(), UnitState::Loaded);
    }

    #[test]
    fn test_enable_does_not_imply_load() {
        let (unit, calls) = unit(Recorder::default());
        unit.enable().unwrap();

        assert_eq!(unit.state(), UnitState::Unloaded);
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn test_failed_load_leaves_unit_unloaded() {
        let (unit, calls) = unit(Recorder {
            fail_load: true,
            ..Recorder::default()
        });

        let failure = unit.load().unwrap_err();
        assert_eq!(failure.hook, Hook::Load);
        assert_eq!(failure.plugin, "Recorder");
        assert_eq!(failure.instance_id, unit.instance_id());
        assert!(matches!(failure.source, PluginError::LoadFailed(_)));
        assert_eq!(unit.state(), UnitState::Unloaded);

        // The transition never happened, so a retry runs the hook again.
        let _ = unit.load();
        assert_eq!(*calls.lock(), vec!["load", "load"]);
    }

    #[test]
    fn test_failed_enable_stays_loaded() {
        let (unit, _calls) = unit(Recorder {
            fail_enable: true,
            ..Recorder::default()
        });
        unit.load().unwrap();

        let failure = unit.enable().unwrap_err();
        assert_eq!(failure.hook, Hook::Enable);
        assert_eq!(unit.state(), UnitState::Loaded);
    }

    #[test]
    fn test_panicking_hook_is_reported() {
        let (unit, _calls) = unit(Recorder {
            panic_disable: true,
            ..Recorder::default()
        });
        unit.load().unwrap();
        unit.enable().unwrap();

        let failure = unit.disable().unwrap_err();
        assert_eq!(failure.hook, Hook::Disable);
        assert!(matches!(failure.source, PluginError::Panicked(ref m) if m == "disable exploded"));
        assert_eq!(unit.state(), UnitState::Enabled);
    }

    #[test]
    fn test_retire_disables_then_freezes() {
        let (unit, calls) = unit(Recorder::default());
        unit.load().unwrap();
        unit.enable().unwrap();

        unit.retire().unwrap();
        assert!(unit.is_retired());
        assert_eq!(unit.state(), UnitState::Loaded);

        unit.enable().unwrap();
        unit.retire().unwrap();
        assert_eq!(unit.state(), UnitState::Loaded);
        assert_eq!(*calls.lock(), vec!["load", "enable", "disable"]);
    }

    #[test]
    fn test_retire_happens_even_if_disable_fails() {
        let (unit, _calls) = unit(Recorder {
            panic_disable: true,
            ..Recorder::default()
        });
        unit.load().unwrap();
        unit.enable().unwrap();

        assert!(unit.retire().is_err());
        assert!(unit.is_retired());
    }

    #[test]
    fn test_failure_message_names_hook_and_plugin() {
        let (unit, _calls) = unit(Recorder {
            fail_load: true,
            ..Recorder::default()
        });
        let message = unit.load().unwrap_err().to_string();
        assert!(message.starts_with("load hook of plugin Recorder"));
        assert!(message.ends_with("failed: Plugin load failed: no resources"));
    }
}
