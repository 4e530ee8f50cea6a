//! Shared test doubles
//!
//! - `TestEngine`: records protect/unprotect/call traffic
//! - `FakeOpener`: serves plugin modules by file name, without a dynamic loader
//! - compliant and legacy in-process modules

// Allow dead code in shared test helpers - not every test binary uses all of them
#![allow(dead_code)]

use std::collections::HashMap;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use widget_plugin_api as api;
use widget_plugin_host::plugin::{
    DynamicLibraryOpener, ForeignModule, ModuleOpener, PluginLoadError, StaticModule,
};
use widget_plugin_host::script::{
    ContextRef, GlobalContextRef, ObjectRef, ScriptEngine, ScriptError, ValueRef,
};

// =============================================================================
// Script engine
// =============================================================================

/// Engine double. Contexts are their own global unless mapped otherwise.
#[derive(Default)]
pub struct TestEngine {
    globals: Mutex<HashMap<ContextRef, GlobalContextRef>>,
    protects: Mutex<HashMap<(GlobalContextRef, ValueRef), usize>>,
    unprotects: Mutex<HashMap<(GlobalContextRef, ValueRef), usize>>,
    properties: Mutex<HashMap<(ObjectRef, String), ValueRef>>,
    calls: Mutex<Vec<(ObjectRef, Vec<ValueRef>)>>,
}

impl TestEngine {
    pub fn map_global(&self, child: ContextRef, global: GlobalContextRef) {
        self.globals.lock().insert(child, global);
    }

    pub fn define(&self, object: ObjectRef, name: &str, value: ValueRef) {
        self.properties.lock().insert((object, name.to_string()), value);
    }

    pub fn protects(&self, global: GlobalContextRef, value: ValueRef) -> usize {
        self.protects.lock().get(&(global, value)).copied().unwrap_or(0)
    }

    pub fn unprotects(&self, global: GlobalContextRef, value: ValueRef) -> usize {
        self.unprotects.lock().get(&(global, value)).copied().unwrap_or(0)
    }

    pub fn total_unprotects(&self) -> usize {
        self.unprotects.lock().values().sum()
    }

    pub fn calls(&self) -> Vec<(ObjectRef, Vec<ValueRef>)> {
        self.calls.lock().clone()
    }
}

impl ScriptEngine for TestEngine {
    fn global_context(&self, context: ContextRef) -> GlobalContextRef {
        self.globals
            .lock()
            .get(&context)
            .copied()
            .unwrap_or(GlobalContextRef::from_addr(context.addr()))
    }

    fn protect(&self, context: GlobalContextRef, value: ValueRef) {
        *self.protects.lock().entry((context, value)).or_default() += 1;
    }

    fn unprotect(&self, context: GlobalContextRef, value: ValueRef) {
        *self.unprotects.lock().entry((context, value)).or_default() += 1;
    }

    fn get_property(&self, _context: ContextRef, object: ObjectRef, name: &str) -> Result<ValueRef, ScriptError> {
        Ok(self
            .properties
            .lock()
            .get(&(object, name.to_string()))
            .copied()
            .unwrap_or(ValueRef::NULL))
    }

    fn set_property(
        &self,
        _context: ContextRef,
        object: ObjectRef,
        name: &str,
        value: ValueRef,
    ) -> Result<(), ScriptError> {
        self.define(object, name, value);
        Ok(())
    }

    fn call_as_function(
        &self,
        _context: ContextRef,
        function: ObjectRef,
        _this: Option<ObjectRef>,
        arguments: &[ValueRef],
    ) -> Result<ValueRef, ScriptError> {
        self.calls.lock().push((function, arguments.to_vec()));
        Ok(ValueRef::NULL)
    }
}

// =============================================================================
// Plugin modules
// =============================================================================

pub static STARTED: Mutex<Vec<api::WidgetId>> = Mutex::new(Vec::new());
pub static STOPPED: Mutex<Vec<api::WidgetId>> = Mutex::new(Vec::new());
pub static FRAMES_LOADED: AtomicUsize = AtomicUsize::new(0);
pub static FRAMES_UNLOADED: AtomicUsize = AtomicUsize::new(0);
pub static FEATURES_SEEN: Mutex<Vec<String>> = Mutex::new(Vec::new());

pub unsafe extern "C" fn on_start(widget_id: api::WidgetId) {
    STARTED.lock().push(widget_id);
}

pub unsafe extern "C" fn on_stop(widget_id: api::WidgetId) {
    STOPPED.lock().push(widget_id);
}

pub unsafe extern "C" fn on_init(mapping: *mut api::FeatureMapping) {
    // SAFETY: the host keeps the mapping alive for the duration of the call.
    let Some(mapping) = (unsafe { mapping.as_ref() }) else {
        return;
    };
    let mut seen = FEATURES_SEEN.lock();
    for feature in unsafe { mapping.features() } {
        let name = unsafe { feature.name() }.to_string_lossy().into_owned();
        let caps: Vec<String> = unsafe { feature.device_capabilities() }
            .map(|cap| cap.to_string_lossy().into_owned())
            .collect();
        seen.push(format!("{}:{}:{}", mapping.widget_id, name, caps.join(",")));
    }
}

pub unsafe extern "C" fn on_frame_load(_context: api::JsContextRef) {
    FRAMES_LOADED.fetch_add(1, Ordering::SeqCst);
}

pub unsafe extern "C" fn on_frame_unload(_context: api::JsContextRef) {
    FRAMES_UNLOADED.fetch_add(1, Ordering::SeqCst);
}

pub static FILESYSTEM_TABLE: api::ClassTable<4> = api::ClassTable([
    api::RawClassDeclaration::new(c"tizen", c"filesystem"),
    api::RawClassDeclaration::new(c"tizen.filesystem", c"File"),
    api::RawClassDeclaration::new(c"tizen.filesystem", c"FileStream"),
    api::RawClassDeclaration::SENTINEL,
]);

pub static STORAGE_TABLE: api::ClassTable<2> = api::ClassTable([
    api::RawClassDeclaration::new(c"tizen", c"storage"),
    api::RawClassDeclaration::SENTINEL,
]);

/// Module exporting every callback and the filesystem class table
pub fn compliant_module(path: impl Into<PathBuf>) -> StaticModule {
    StaticModule::with_path(path)
        .with_symbol(api::WIDGET_START_PROC, on_start as *const c_void)
        .with_symbol(api::WIDGET_STOP_PROC, on_stop as *const c_void)
        .with_symbol(api::WIDGET_INIT_PROC, on_init as *const c_void)
        .with_symbol(api::FRAME_LOAD_PROC, on_frame_load as *const c_void)
        .with_symbol(api::FRAME_UNLOAD_PROC, on_frame_unload as *const c_void)
        .with_symbol(api::CLASS_MAP, FILESYSTEM_TABLE.as_ptr() as *const c_void)
}

/// Module with only the required symbols and the storage class table
pub fn minimal_module(path: impl Into<PathBuf>) -> StaticModule {
    StaticModule::with_path(path)
        .with_symbol(api::WIDGET_START_PROC, on_start as *const c_void)
        .with_symbol(api::WIDGET_STOP_PROC, on_stop as *const c_void)
        .with_symbol(api::CLASS_MAP, STORAGE_TABLE.as_ptr() as *const c_void)
}

/// Module written against an older ABI: no stop callback
pub fn legacy_module(path: impl Into<PathBuf>) -> StaticModule {
    StaticModule::with_path(path)
        .with_symbol(api::WIDGET_START_PROC, on_start as *const c_void)
        .with_symbol(api::CLASS_MAP, FILESYSTEM_TABLE.as_ptr() as *const c_void)
}

/// Opens modules by file name prefix:
/// - `libfull*`: every callback, filesystem classes
/// - `libmin*`: required callbacks only, storage classes
/// - `liblegacy*`: missing the stop callback
///
/// Anything else goes to the real dynamic loader.
#[derive(Default)]
pub struct FakeOpener {
    opened: AtomicUsize,
    closed: std::sync::Arc<AtomicUsize>,
}

impl FakeOpener {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Modules served by this opener that have since been closed
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ModuleOpener for FakeOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn ForeignModule>, PluginLoadError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();

        let module = if name.starts_with("libfull") {
            compliant_module(path)
        } else if name.starts_with("libmin") {
            minimal_module(path)
        } else if name.starts_with("liblegacy") {
            legacy_module(path)
        } else {
            return DynamicLibraryOpener.open(path);
        };

        Ok(Box::new(ClosingModule {
            inner: module,
            closed: self.closed.clone(),
        }))
    }
}

/// Counts closes so tests can check that rejected modules are released
struct ClosingModule {
    inner: StaticModule,
    closed: std::sync::Arc<AtomicUsize>,
}

impl ForeignModule for ClosingModule {
    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn resolve_symbol(&self, name: &std::ffi::CStr) -> Option<std::ptr::NonNull<c_void>> {
        self.inner.resolve_symbol(name)
    }
}

impl Drop for ClosingModule {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Write a placeholder file that is not a loadable module
pub fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"\x7fELF not really").unwrap();
    path
}
