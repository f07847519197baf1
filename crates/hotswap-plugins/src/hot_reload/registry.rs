//! Module registry
//!
//! Maps every module file in the plugin directory to the lifecycle units built
//! from it, and keeps that map in step with the directory.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded, select};
use hotswap_kernel::Plugin;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::loader::{ModuleLoader, sha256_file};
use super::sink::LogSink;
use super::state::{HookFailure, LifecycleUnit, UnitState};
use super::watcher::{ChangeCoalescer, ModuleEvent};

/// Absolute path of a module file; the registry's key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleSource(PathBuf);

impl ModuleSource {
    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn file_name(&self) -> String {
        self.0
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl fmt::Display for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Outcome of the most recent reload of a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ModuleStatus {
    /// The loader ran; the entry holds whatever instances it produced
    Loaded,
    /// The loader refused the module
    Failed { reason: String },
    /// The file was gone when the reload ran
    Missing,
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleStatus::Loaded => write!(f, "loaded"),
            ModuleStatus::Failed { reason } => write!(f, "failed: {}", reason),
            ModuleStatus::Missing => write!(f, "missing"),
        }
    }
}

/// One registry entry, as seen by `modules()`
#[derive(Debug, Clone, Serialize)]
pub struct ModuleSnapshot {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: ModuleStatus,
    /// SHA-256 of the file contents at reload time
    pub digest: Option<String>,
    pub plugins: usize,
}

/// One lifecycle unit, as seen by the plugin views
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginSnapshot {
    pub module: PathBuf,
    pub name: String,
    pub instance_id: Uuid,
    pub state: UnitState,
}

impl PluginSnapshot {
    fn of(unit: &LifecycleUnit) -> Self {
        Self {
            module: unit.module().to_path_buf(),
            name: unit.name().to_string(),
            instance_id: unit.instance_id(),
            state: unit.state(),
        }
    }
}

/// Result of fanning one transition out over many units.
///
/// A failing unit never stops the others; its failure is collected here.
#[derive(Debug, Default)]
pub struct LifecycleReport {
    /// Units the transition was applied to
    pub attempted: usize,
    pub failures: Vec<HookFailure>,
}

impl LifecycleReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, result: Result<(), HookFailure>) {
        self.attempted += 1;
        if let Err(failure) = result {
            self.failures.push(failure);
        }
    }

    fn merge(&mut self, other: LifecycleReport) {
        self.attempted += other.attempted;
        self.failures.extend(other.failures);
    }
}

type Units = Arc<[Arc<LifecycleUnit>]>;

struct ModuleEntry {
    units: Units,
    status: ModuleStatus,
    digest: Option<String>,
}

impl ModuleEntry {
    fn empty(status: ModuleStatus, digest: Option<String>) -> Self {
        Self {
            units: Arc::from(Vec::new()),
            status,
            digest,
        }
    }
}

/// State shared between the registry handle and its event pump
struct Shared {
    /// Canonical plugin directory; `None` when it did not exist at construction
    directory: Option<PathBuf>,
    loader: Arc<dyn ModuleLoader>,
    sink: LogSink,
    entries: RwLock<BTreeMap<ModuleSource, ModuleEntry>>,
    /// Serializes reloads and removals
    reconcile: Mutex<()>,
}

impl Shared {
    fn source(&self, path: &Path) -> Option<ModuleSource> {
        let directory = self.directory.as_ref()?;
        if path.is_absolute() {
            Some(ModuleSource(path.to_path_buf()))
        } else {
            Some(ModuleSource(directory.join(path)))
        }
    }

    fn units_of(&self, source: &ModuleSource) -> Option<Units> {
        self.entries.read().get(source).map(|e| e.units.clone())
    }

    fn all_units(&self) -> Vec<Arc<LifecycleUnit>> {
        self.entries
            .read()
            .values()
            .flat_map(|e| e.units.iter().cloned())
            .collect()
    }

    fn apply<F>(&self, units: &[Arc<LifecycleUnit>], transition: F) -> LifecycleReport
    where
        F: Fn(&LifecycleUnit) -> Result<(), HookFailure>,
    {
        let mut report = LifecycleReport::default();
        for unit in units {
            let result = transition(unit.as_ref());
            if let Err(failure) = &result {
                self.sink.write_line(failure.to_string());
            }
            report.record(result);
        }
        report
    }

    fn handle(&self, event: ModuleEvent) -> LifecycleReport {
        debug!("Handling {:?}", event);
        match event {
            ModuleEvent::Added(path) => self.on_added(&path),
            ModuleEvent::Removed(path) => self.on_removed(&path),
        }
    }

    fn reload(&self, path: &Path) -> LifecycleReport {
        let _guard = self.reconcile.lock();
        self.reload_locked(path).0
    }

    fn on_added(&self, path: &Path) -> LifecycleReport {
        let _guard = self.reconcile.lock();
        let (mut report, source) = self.reload_locked(path);
        if let Some(units) = source.and_then(|s| self.units_of(&s)) {
            report.merge(self.apply(&units, LifecycleUnit::load));
        }
        report
    }

    fn on_removed(&self, path: &Path) -> LifecycleReport {
        let _guard = self.reconcile.lock();
        let Some(source) = self.source(path) else {
            return LifecycleReport::default();
        };
        let Some(units) = self.units_of(&source) else {
            debug!("Removed path {:?} has no entry", path);
            return LifecycleReport::default();
        };

        let report = self.apply(&units, LifecycleUnit::retire);
        self.entries.write().remove(&source);
        self.sink.write_line(format!("Module removed: {}", source));
        report
    }

    /// Replace the entry for `path` with fresh, unloaded units.
    ///
    /// Must be called with the reconcile lock held.
    fn reload_locked(&self, path: &Path) -> (LifecycleReport, Option<ModuleSource>) {
        let mut report = LifecycleReport::default();
        let Some(source) = self.source(path) else {
            return (report, None);
        };
        if !self.loader.is_module(source.path()) {
            debug!("Ignoring non-module path {:?}", source.path());
            return (report, None);
        }

        self.sink.write_line(format!("Reloading module: {}", source));

        if let Some(previous) = self.units_of(&source) {
            report = self.apply(&previous, LifecycleUnit::retire);
        }
        self.entries
            .write()
            .insert(source.clone(), ModuleEntry::empty(ModuleStatus::Missing, None));

        if !source.path().is_file() {
            debug!("Module {} no longer exists", source);
            return (report, Some(source));
        }

        let digest = sha256_file(source.path()).ok();
        let entry = match self.loader.load(source.path(), &self.sink) {
            Ok(plugins) => {
                let units: Units = plugins
                    .into_iter()
                    .map(|plugin| Arc::new(LifecycleUnit::new(plugin, source.path())))
                    .collect();
                info!("Module {} provides {} plugin(s)", source, units.len());
                ModuleEntry {
                    units,
                    status: ModuleStatus::Loaded,
                    digest,
                }
            }
            Err(_) if !source.path().exists() => {
                debug!("Module {} was deleted while loading", source);
                ModuleEntry::empty(ModuleStatus::Missing, None)
            }
            Err(e) => {
                self.sink
                    .write_line(format!("Module failed to load: {} ({})", source.file_name(), e));
                ModuleEntry::empty(
                    ModuleStatus::Failed {
                        reason: e.to_string(),
                    },
                    digest,
                )
            }
        };

        self.entries.write().insert(source.clone(), entry);
        (report, Some(source))
    }
}

/// Keeps plugin instances synchronized with a directory of modules.
///
/// Construction scans the directory and builds unloaded units for every
/// module found. A background thread then applies watch events: a module that
/// appears or changes is reloaded and its new units loaded (never enabled); a
/// module that disappears has its units disabled and dropped. The host drives
/// the global phases with [`load_all`](Self::load_all),
/// [`enable_all`](Self::enable_all) and [`disable_all`](Self::disable_all).
pub struct ModuleRegistry {
    shared: Arc<Shared>,
    coalescer: Mutex<Option<ChangeCoalescer>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    stop_tx: Mutex<Option<Sender<()>>>,
    closed: Arc<AtomicBool>,
}

impl ModuleRegistry {
    /// Scan `directory` and keep watching it.
    pub fn new<P: AsRef<Path>>(directory: P, loader: Arc<dyn ModuleLoader>, sink: LogSink) -> Self {
        Self::build(directory.as_ref(), loader, sink, true)
    }

    /// Scan `directory` once. Later changes only arrive through
    /// [`handle`](Self::handle) or [`reload`](Self::reload).
    pub fn without_watch<P: AsRef<Path>>(
        directory: P,
        loader: Arc<dyn ModuleLoader>,
        sink: LogSink,
    ) -> Self {
        Self::build(directory.as_ref(), loader, sink, false)
    }

    fn build(directory: &Path, loader: Arc<dyn ModuleLoader>, sink: LogSink, watch: bool) -> Self {
        if !directory.is_dir() {
            sink.write_line(format!("Plugins directory does not exist: {}", directory.display()));
            sink.write_line("Additional plugins will not be loaded.");
            return Self::from_parts(None, loader, sink);
        }

        let directory = directory
            .canonicalize()
            .unwrap_or_else(|_| directory.to_path_buf());

        let mut coalescer = None;
        if watch {
            match ChangeCoalescer::watch(&directory) {
                Ok(c) => coalescer = Some(c),
                Err(e) => sink.write_line(format!(
                    "Unable to watch plugins directory {}: {}",
                    directory.display(),
                    e
                )),
            }
        }
        let events = coalescer.as_mut().and_then(|c| c.take_receiver());

        let registry = Self::from_parts(Some(directory), loader, sink);
        *registry.coalescer.lock() = coalescer;

        // Events raised during the scan stay buffered until the pump starts.
        for path in registry.module_files() {
            registry.shared.reload(&path);
        }

        if let Some(events) = events {
            registry.spawn_pump(events);
        }
        registry
    }

    fn from_parts(directory: Option<PathBuf>, loader: Arc<dyn ModuleLoader>, sink: LogSink) -> Self {
        Self {
            shared: Arc::new(Shared {
                directory,
                loader,
                sink,
                entries: RwLock::new(BTreeMap::new()),
                reconcile: Mutex::new(()),
            }),
            coalescer: Mutex::new(None),
            pump: Mutex::new(None),
            stop_tx: Mutex::new(None),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn spawn_pump(&self, events: Receiver<ModuleEvent>) {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let shared = self.shared.clone();
        let closed = self.closed.clone();

        let spawned = thread::Builder::new()
            .name("hotswap-reload".to_string())
            .spawn(move || {
                loop {
                    select! {
                        recv(events) -> msg => match msg {
                            Ok(event) => {
                                if closed.load(Ordering::Acquire) {
                                    break;
                                }
                                let report = shared.handle(event);
                                if !report.is_clean() {
                                    warn!("{} hook failure(s) while applying event", report.failures.len());
                                }
                            }
                            Err(_) => break,
                        },
                        recv(stop_rx) -> _ => break,
                    }
                }
                debug!("Reload event pump stopped");
            });

        match spawned {
            Ok(handle) => {
                *self.pump.lock() = Some(handle);
                *self.stop_tx.lock() = Some(stop_tx);
            }
            Err(e) => {
                self.shared
                    .sink
                    .write_line(format!("Unable to start reload thread: {}", e));
            }
        }
    }

    /// Canonical plugin directory, `None` if it did not exist.
    pub fn directory(&self) -> Option<&Path> {
        self.shared.directory.as_deref()
    }

    pub fn is_watching(&self) -> bool {
        self.coalescer
            .lock()
            .as_ref()
            .is_some_and(|c| c.is_active())
    }

    /// Rebuild the entry for one module file. New units are left unloaded.
    pub fn reload<P: AsRef<Path>>(&self, path: P) -> LifecycleReport {
        self.shared.reload(path.as_ref())
    }

    /// Apply one change event, as the watch thread does.
    pub fn handle(&self, event: ModuleEvent) -> LifecycleReport {
        self.shared.handle(event)
    }

    /// Reload the module and load its new units.
    pub fn on_added<P: AsRef<Path>>(&self, path: P) -> LifecycleReport {
        self.shared.on_added(path.as_ref())
    }

    /// Disable and drop every unit of the module.
    pub fn on_removed<P: AsRef<Path>>(&self, path: P) -> LifecycleReport {
        self.shared.on_removed(path.as_ref())
    }

    pub fn load_all(&self) -> LifecycleReport {
        let units = self.shared.all_units();
        self.shared.apply(&units, LifecycleUnit::load)
    }

    pub fn enable_all(&self) -> LifecycleReport {
        let units = self.shared.all_units();
        self.shared.apply(&units, LifecycleUnit::enable)
    }

    pub fn disable_all(&self) -> LifecycleReport {
        let units = self.shared.all_units();
        self.shared.apply(&units, LifecycleUnit::disable)
    }

    /// Every unit, in module then discovery order.
    pub fn plugins(&self) -> Vec<PluginSnapshot> {
        self.snapshots(|_| true)
    }

    pub fn loaded_plugins(&self) -> Vec<PluginSnapshot> {
        self.snapshots(UnitState::is_loaded)
    }

    pub fn enabled_plugins(&self) -> Vec<PluginSnapshot> {
        self.snapshots(UnitState::is_enabled)
    }

    fn snapshots(&self, keep: impl Fn(UnitState) -> bool) -> Vec<PluginSnapshot> {
        self.shared
            .all_units()
            .iter()
            .map(|unit| PluginSnapshot::of(unit))
            .filter(|snapshot| keep(snapshot.state))
            .collect()
    }

    pub fn modules(&self) -> Vec<ModuleSnapshot> {
        self.shared
            .entries
            .read()
            .iter()
            .map(|(source, entry)| ModuleSnapshot {
                path: source.path().to_path_buf(),
                status: entry.status.clone(),
                digest: entry.digest.clone(),
                plugins: entry.units.len(),
            })
            .collect()
    }

    /// Module files currently in the directory, sorted by path.
    pub fn module_files(&self) -> Vec<PathBuf> {
        let Some(directory) = self.shared.directory.as_ref() else {
            return Vec::new();
        };

        let read = match fs::read_dir(directory) {
            Ok(read) => read,
            Err(e) => {
                self.shared
                    .sink
                    .write_line(format!("Unable to list {}: {}", directory.display(), e));
                return Vec::new();
            }
        };

        let mut files: Vec<PathBuf> = read
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && self.shared.loader.is_module(path))
            .collect();
        files.sort();

        for file in &files {
            self.shared
                .sink
                .write_line(format!("Found module: {}", file.display()));
        }
        files
    }

    /// Run `f` on every enabled plugin instance.
    pub fn for_each_enabled<F>(&self, mut f: F)
    where
        F: FnMut(&mut dyn Plugin),
    {
        for unit in self.shared.all_units() {
            if unit.is_enabled() {
                unit.with_plugin(|plugin| f(plugin));
            }
        }
    }

    /// Stop watching, let the event thread finish, then disable every unit.
    ///
    /// Only the first call does anything.
    pub fn shutdown(&self) -> LifecycleReport {
        if self.closed.swap(true, Ordering::AcqRel) {
            return LifecycleReport::default();
        }

        if let Some(mut coalescer) = self.coalescer.lock().take() {
            coalescer.shutdown();
        }
        drop(self.stop_tx.lock().take());

        if let Some(handle) = self.pump.lock().take() {
            if handle.thread().id() == thread::current().id() {
                warn!("Registry shut down from its own event thread");
            } else if handle.join().is_err() {
                warn!("Reload event pump panicked");
            }
        }

        let report = self.disable_all();
        info!("Module registry shut down ({} unit(s))", report.attempted);
        report
    }
}

impl Drop for ModuleRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("directory", &self.shared.directory)
            .field("modules", &self.shared.entries.read().len())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}
