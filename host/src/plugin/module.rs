//! Foreign Module Boundary
//!
//! Every raw symbol lookup the host performs goes through [`ForeignModule`].
//! A module is closed when it is dropped, so a module value that goes out of
//! scope (for example after failing ABI validation) can never leak its handle.
//!
//! Two implementations are provided:
//! - [`DynamicLibrary`]: a shared library opened with `libloading`
//! - [`StaticModule`]: symbols that are linked into the host binary itself
//!   (built-in plugins), resolved from an in-process table

use std::collections::HashMap;
use std::ffi::{CStr, CString, c_void};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use super::loader::PluginLoadError;

/// A loaded binary module that can resolve symbols by name.
pub trait ForeignModule: Send + Sync {
    /// Path (or pseudo-path for built-in modules) the module was opened from
    fn path(&self) -> &Path;

    /// Resolve a symbol address, or `None` when the module does not export it
    fn resolve_symbol(&self, name: &CStr) -> Option<NonNull<c_void>>;
}

/// Opens modules for the loader.
///
/// The loader never calls `libloading` directly; swapping the opener is how
/// built-in or test modules are served under ordinary file paths.
pub trait ModuleOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn ForeignModule>, PluginLoadError>;
}

/// Opens shared libraries from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicLibraryOpener;

impl ModuleOpener for DynamicLibraryOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn ForeignModule>, PluginLoadError> {
        Ok(Box::new(DynamicLibrary::open(path)?))
    }
}

/// A shared library opened with lazy symbol binding.
pub struct DynamicLibrary {
    library: libloading::Library,
    path: PathBuf,
}

impl DynamicLibrary {
    /// Open a shared library.
    ///
    /// # Errors
    ///
    /// Returns [`PluginLoadError::OpenFailed`] carrying the dynamic loader's
    /// diagnostic when the file is missing or is not a loadable module.
    pub fn open(path: &Path) -> Result<Self, PluginLoadError> {
        // SAFETY: opening a library runs its initialisers. Plugins are trusted
        // native code by contract; there is no way to verify them beforehand.
        #[cfg(unix)]
        let library = unsafe {
            use libloading::os::unix::{Library as UnixLibrary, RTLD_LAZY, RTLD_LOCAL};
            UnixLibrary::open(Some(path), RTLD_LAZY | RTLD_LOCAL).map(libloading::Library::from)
        };

        #[cfg(not(unix))]
        let library = unsafe { libloading::Library::new(path) };

        let library = library.map_err(|e| PluginLoadError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        tracing::trace!(path = %path.display(), "Opened module");

        Ok(Self {
            library,
            path: path.to_path_buf(),
        })
    }
}

impl ForeignModule for DynamicLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn resolve_symbol(&self, name: &CStr) -> Option<NonNull<c_void>> {
        // SAFETY: the symbol is read as a bare address; callers reinterpret it
        // only through the ABI types declared in `widget_plugin_api`.
        let symbol = unsafe { self.library.get::<*mut c_void>(name.to_bytes_with_nul()) }.ok()?;
        NonNull::new(*symbol)
    }
}

impl Drop for DynamicLibrary {
    fn drop(&mut self) {
        tracing::trace!(path = %self.path.display(), "Closing module");
    }
}

/// A module whose symbols live in the host process.
///
/// Used for plugins compiled into the host and for exercising the loader
/// without a shared library on disk.
pub struct StaticModule {
    path: PathBuf,
    symbols: HashMap<CString, usize>,
}

impl StaticModule {
    /// Create an empty built-in module named `builtin:<name>`.
    pub fn new(name: &str) -> Self {
        Self::with_path(format!("builtin:{name}"))
    }

    /// Create an empty module answering to an arbitrary path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            symbols: HashMap::new(),
        }
    }

    /// Export `address` under `name`. Null addresses are ignored.
    pub fn with_symbol(mut self, name: &CStr, address: *const c_void) -> Self {
        if !address.is_null() {
            self.symbols.insert(name.to_owned(), address as usize);
        }
        self
    }

    /// Names currently exported
    pub fn symbol_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .symbols
            .keys()
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

impl ForeignModule for StaticModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn resolve_symbol(&self, name: &CStr) -> Option<NonNull<c_void>> {
        self.symbols
            .get(name)
            .and_then(|address| NonNull::new(*address as *mut c_void))
    }
}

/// Resolve a function symbol and reinterpret it as the function pointer `F`.
///
/// # Safety
///
/// `F` must be an `extern "C"` function pointer type matching the symbol's
/// real signature. The returned pointer is only valid while `module` lives.
pub(crate) unsafe fn resolve_function<F: Copy>(module: &dyn ForeignModule, name: &CStr) -> Option<F> {
    debug_assert_eq!(
        std::mem::size_of::<F>(),
        std::mem::size_of::<*mut c_void>(),
        "symbol type must be pointer-sized"
    );
    let address = module.resolve_symbol(name)?.as_ptr();
    // SAFETY: guaranteed by the caller.
    Some(unsafe { std::mem::transmute_copy::<*mut c_void, F>(&address) })
}
