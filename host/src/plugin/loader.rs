//! Foreign Module Loader
//!
//! Turns one candidate module into a [`Plugin`]: resolve the fixed ABI
//! symbols, check that the required ones are present and parse the class
//! declaration table.
//!
//! # Failure handling
//!
//! A module that cannot be opened, or that lacks one of the required symbols
//! (widget start, widget stop, class table), does not implement the current
//! plugin ABI. It is logged at `warn`, closed, and the loader returns `None`
//! so that a batch scan keeps going.
//!
//! # Diagnostics
//!
//! Symbol resolution results and the parsed class table are logged at `info`
//! when verbose loading is enabled and at `trace` otherwise.

use std::ffi::CStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use widget_plugin_api as api;

use super::class::{Class, parse_class_table};
use super::module::{DynamicLibraryOpener, ForeignModule, ModuleOpener, resolve_function};
use crate::script::ContextRef;

/// Errors that can occur during plugin loading
#[derive(Debug, thiserror::Error)]
pub enum PluginLoadError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to open module {}: {reason}", path.display())]
    OpenFailed { path: PathBuf, reason: String },

    #[error("Module {} does not export required symbol `{symbol}`", path.display())]
    MissingSymbol { path: PathBuf, symbol: String },

    #[error("Plugin directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("Plugin path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

/// Log at `info` when verbose loading is on, at `trace` otherwise.
macro_rules! load_log {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+);
        } else {
            tracing::trace!($($arg)+);
        }
    };
}

/// Lifecycle entry points resolved from a plugin module
#[derive(Debug, Clone, Copy)]
pub struct PluginCallbacks {
    pub start: api::WidgetStartProc,
    pub stop: api::WidgetStopProc,
    pub init: Option<api::WidgetInitProc>,
    pub frame_load: Option<api::FrameLoadProc>,
    pub frame_unload: Option<api::FrameUnloadProc>,
}

/// A successfully loaded plugin module.
///
/// Owns the module handle. Every function pointer held here (callbacks and
/// anything reachable from the class list) is valid only while the plugin is
/// alive; the module is closed when the plugin is dropped.
pub struct Plugin {
    path: PathBuf,
    callbacks: PluginCallbacks,
    classes: Vec<Class>,
    // Dropped last so nothing above outlives the code it points into.
    module: Box<dyn ForeignModule>,
}

impl Plugin {
    /// Path the module was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Class declarations in table order
    pub fn classes(&self) -> &[Class] {
        &self.classes
    }

    pub fn callbacks(&self) -> &PluginCallbacks {
        &self.callbacks
    }

    /// The module backing this plugin
    pub fn module(&self) -> &dyn ForeignModule {
        self.module.as_ref()
    }

    pub fn has_init(&self) -> bool {
        self.callbacks.init.is_some()
    }

    pub fn has_frame_load(&self) -> bool {
        self.callbacks.frame_load.is_some()
    }

    pub fn has_frame_unload(&self) -> bool {
        self.callbacks.frame_unload.is_some()
    }

    /// Invoke the widget start callback.
    pub fn widget_start(&self, widget_id: api::WidgetId) {
        // SAFETY: resolved from the module `self` keeps open. Plugin code is
        // trusted; a fault inside it is fatal to the process.
        unsafe { (self.callbacks.start)(widget_id) }
    }

    /// Invoke the widget stop callback.
    pub fn widget_stop(&self, widget_id: api::WidgetId) {
        // SAFETY: see `widget_start`.
        unsafe { (self.callbacks.stop)(widget_id) }
    }

    /// Invoke the widget init callback. Returns `false` when the plugin does
    /// not export one.
    pub fn widget_init(&self, mapping: &api::FeatureMapping) -> bool {
        match self.callbacks.init {
            Some(init) => {
                // SAFETY: see `widget_start`. `mapping` is valid for the call
                // and plugins only read it, despite the mutable ABI pointer.
                unsafe { init(mapping as *const api::FeatureMapping as *mut api::FeatureMapping) };
                true
            }
            None => false,
        }
    }

    /// Invoke the frame load callback, if exported.
    pub fn frame_load(&self, context: ContextRef) -> bool {
        match self.callbacks.frame_load {
            Some(frame_load) => {
                // SAFETY: see `widget_start`.
                unsafe { frame_load(context.as_ptr()) };
                true
            }
            None => false,
        }
    }

    /// Invoke the frame unload callback, if exported.
    pub fn frame_unload(&self, context: ContextRef) -> bool {
        match self.callbacks.frame_unload {
            Some(frame_unload) => {
                // SAFETY: see `widget_start`.
                unsafe { frame_unload(context.as_ptr()) };
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("path", &self.path)
            .field("classes", &self.classes.len())
            .field("init", &self.has_init())
            .field("frame_load", &self.has_frame_load())
            .field("frame_unload", &self.has_frame_unload())
            .finish()
    }
}

/// Opens candidate modules and validates them against the plugin ABI
pub struct PluginLoader {
    opener: Arc<dyn ModuleOpener>,
    verbose: bool,
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new(Arc::new(DynamicLibraryOpener), false)
    }
}

impl PluginLoader {
    /// Create a loader that opens modules through `opener`
    pub fn new(opener: Arc<dyn ModuleOpener>, verbose: bool) -> Self {
        Self { opener, verbose }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Open and validate the module at `path`.
    ///
    /// Returns `None` when the file cannot be opened or does not implement
    /// the ABI. Neither case is an error for the caller.
    pub fn load(&self, path: &Path) -> Option<Plugin> {
        load_log!(self.verbose, path = %path.display(), "Loading plugin module");

        let module = match self.opener.open(path) {
            Ok(module) => module,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping module that failed to open");
                return None;
            }
        };

        self.load_module(module)
    }

    /// Validate an already opened module.
    pub fn load_module(&self, module: Box<dyn ForeignModule>) -> Option<Plugin> {
        let path = module.path().to_path_buf();
        match self.try_load_module(module) {
            Ok(plugin) => {
                tracing::info!(
                    path = %plugin.path.display(),
                    classes = plugin.classes.len(),
                    "Loaded plugin"
                );
                Some(plugin)
            }
            Err(e) => {
                // The module was consumed by `try_load_module` and is closed
                // by the time we get here.
                tracing::warn!(path = %path.display(), error = %e, "Skipping module");
                None
            }
        }
    }

    fn try_load_module(&self, module: Box<dyn ForeignModule>) -> Result<Plugin, PluginLoadError> {
        let path = module.path().to_path_buf();
        let verbose = self.verbose;

        // SAFETY: every symbol below is reinterpreted with the signature the
        // plugin ABI assigns to its name.
        let start = unsafe { resolve_function::<api::WidgetStartProc>(module.as_ref(), api::WIDGET_START_PROC) };
        let init = unsafe { resolve_function::<api::WidgetInitProc>(module.as_ref(), api::WIDGET_INIT_PROC) };
        let stop = unsafe { resolve_function::<api::WidgetStopProc>(module.as_ref(), api::WIDGET_STOP_PROC) };
        let frame_load = unsafe { resolve_function::<api::FrameLoadProc>(module.as_ref(), api::FRAME_LOAD_PROC) };
        let frame_unload =
            unsafe { resolve_function::<api::FrameUnloadProc>(module.as_ref(), api::FRAME_UNLOAD_PROC) };

        for (symbol, found) in [
            (api::WIDGET_START_PROC, start.is_some()),
            (api::WIDGET_INIT_PROC, init.is_some()),
            (api::WIDGET_STOP_PROC, stop.is_some()),
            (api::FRAME_LOAD_PROC, frame_load.is_some()),
            (api::FRAME_UNLOAD_PROC, frame_unload.is_some()),
        ] {
            load_log!(verbose, path = %path.display(), symbol = %symbol_name(symbol), found, "Resolved symbol");
        }

        // No plugin code runs before the required callbacks are known to exist.
        let start = start.ok_or_else(|| missing(&path, api::WIDGET_START_PROC))?;
        let stop = stop.ok_or_else(|| missing(&path, api::WIDGET_STOP_PROC))?;
        let table = self.resolve_class_table(module.as_ref()).ok_or_else(|| PluginLoadError::MissingSymbol {
            path: path.clone(),
            symbol: format!(
                "{} or {}",
                symbol_name(api::GET_CLASS_MAP_PROC),
                symbol_name(api::CLASS_MAP)
            ),
        })?;

        // SAFETY: the table comes from a module that exports the full ABI and
        // is sentinel-terminated by contract.
        let classes = unsafe { parse_class_table(table) };

        for (index, class) in classes.iter().enumerate() {
            load_log!(
                verbose,
                path = %path.display(),
                index,
                parent = class.parent_name(),
                name = class.name(),
                interface = class.interface_name().unwrap_or(""),
                "Parsed class declaration"
            );
        }

        Ok(Plugin {
            path,
            callbacks: PluginCallbacks {
                start,
                stop,
                init,
                frame_load,
                frame_unload,
            },
            classes,
            module,
        })
    }

    /// Locate the class table, preferring the getter over the exported array.
    fn resolve_class_table(&self, module: &dyn ForeignModule) -> Option<*const api::RawClassDeclaration> {
        // SAFETY: the getter symbol has the ABI's getter signature.
        let getter = unsafe { resolve_function::<api::GetClassMapProc>(module, api::GET_CLASS_MAP_PROC) };
        if let Some(getter) = getter {
            // SAFETY: plugin code is trusted.
            let table = unsafe { getter() };
            load_log!(self.verbose, path = %module.path().display(), null = table.is_null(), "Class table getter called");
            if !table.is_null() {
                return Some(table);
            }
        }

        // The array symbol's address is the first record of the table.
        let table = module.resolve_symbol(api::CLASS_MAP)?;
        load_log!(self.verbose, path = %module.path().display(), "Using exported class table array");
        Some(table.as_ptr() as *const api::RawClassDeclaration)
    }
}

fn missing(path: &Path, symbol: &CStr) -> PluginLoadError {
    PluginLoadError::MissingSymbol {
        path: path.to_path_buf(),
        symbol: symbol_name(symbol),
    }
}

fn symbol_name(symbol: &CStr) -> String {
    symbol.to_string_lossy().into_owned()
}
