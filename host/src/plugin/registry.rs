//! Plugin Registry
//!
//! Collection of loaded plugins keyed by normalized file path.
//!
//! # Architecture
//!
//! The registry uses DashMap for storage. Each entry holds an `Arc<Plugin>`,
//! so a plugin (and its module handle) stays alive as long as any consumer,
//! such as the class map, still references it. [`PluginRegistry::plugins`]
//! returns a sorted snapshot, which means no map lock is held while plugin
//! code runs during lifecycle fan-out.
//!
//! Loading and unloading are expected to happen in a single-threaded
//! discovery phase. Concurrent loads of the same path resolve to whichever
//! insert lands first.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use super::loader::{Plugin, PluginLoadError, PluginLoader};
use super::module::ForeignModule;

/// Outcome of a batch load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    /// Candidates that produced a new plugin
    pub loaded: usize,
    /// Candidates that failed to open or did not implement the ABI
    pub skipped: usize,
    /// Candidates whose path was already registered
    pub already_loaded: usize,
}

impl LoadSummary {
    /// Number of candidates considered
    pub fn total(&self) -> usize {
        self.loaded + self.skipped + self.already_loaded
    }

    /// Add the counts of `other` to this summary
    pub fn merge(&mut self, other: LoadSummary) {
        self.loaded += other.loaded;
        self.skipped += other.skipped;
        self.already_loaded += other.already_loaded;
    }
}

enum LoadOutcome {
    Loaded(Arc<Plugin>),
    AlreadyLoaded(Arc<Plugin>),
    Skipped,
}

/// Library suffix for the current platform (`.so`, `.dylib` or `.dll`)
pub fn default_library_suffixes() -> Vec<String> {
    vec![std::env::consts::DLL_SUFFIX.to_string()]
}

/// Registry of loaded plugins
pub struct PluginRegistry {
    loader: PluginLoader,
    plugins: DashMap<PathBuf, Arc<Plugin>>,
    suffixes: Vec<String>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new(PluginLoader::default())
    }
}

impl PluginRegistry {
    /// Create an empty registry that loads modules through `loader`
    pub fn new(loader: PluginLoader) -> Self {
        Self {
            loader,
            plugins: DashMap::new(),
            suffixes: default_library_suffixes(),
        }
    }

    /// Replace the candidate filter used by [`discover`](Self::discover).
    ///
    /// An empty list accepts every regular file.
    pub fn with_suffixes(mut self, suffixes: Vec<String>) -> Self {
        self.suffixes = suffixes;
        self
    }

    pub fn loader(&self) -> &PluginLoader {
        &self.loader
    }

    /// Load one module. Returns the existing plugin if the path is already
    /// registered, or `None` if the module was skipped.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Option<Arc<Plugin>> {
        match self.load_entry(path.as_ref()) {
            LoadOutcome::Loaded(plugin) | LoadOutcome::AlreadyLoaded(plugin) => Some(plugin),
            LoadOutcome::Skipped => None,
        }
    }

    /// Register a module that is already open, such as a built-in plugin.
    pub fn load_module(&self, module: Box<dyn ForeignModule>) -> Option<Arc<Plugin>> {
        let key = module.path().to_path_buf();
        if let Some(existing) = self.get(&key) {
            tracing::debug!(path = %key.display(), "Module already registered");
            return Some(existing);
        }

        let plugin = self.loader.load_module(module)?;
        Some(self.insert(key, plugin))
    }

    /// Load every path in `paths`. Failures are counted, never propagated.
    pub fn load_paths<I, P>(&self, paths: I) -> LoadSummary
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut summary = LoadSummary::default();
        for path in paths {
            match self.load_entry(path.as_ref()) {
                LoadOutcome::Loaded(_) => summary.loaded += 1,
                LoadOutcome::AlreadyLoaded(_) => summary.already_loaded += 1,
                LoadOutcome::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    /// Discover and load every candidate in `dir`.
    ///
    /// # Errors
    ///
    /// Fails when the directory is missing or cannot be enumerated. Individual
    /// candidates that fail to load are only counted as skipped.
    pub fn load_directory(&self, dir: impl AsRef<Path>) -> Result<LoadSummary, PluginLoadError> {
        let dir = dir.as_ref();
        let candidates = self.discover(dir)?;
        let summary = self.load_paths(&candidates);

        tracing::info!(
            path = %dir.display(),
            loaded = summary.loaded,
            skipped = summary.skipped,
            already_loaded = summary.already_loaded,
            "Loaded plugin directory"
        );

        Ok(summary)
    }

    /// Load several directories, stopping at the first one that cannot be
    /// enumerated.
    pub fn load_directories<I, P>(&self, dirs: I) -> Result<LoadSummary, PluginLoadError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut summary = LoadSummary::default();
        for dir in dirs {
            summary.merge(self.load_directory(dir)?);
        }
        Ok(summary)
    }

    /// List candidate module files in `dir`, sorted by path.
    ///
    /// Only regular files whose name ends in one of the configured library
    /// suffixes are returned. Subdirectories are not searched.
    pub fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>, PluginLoadError> {
        if !dir.exists() {
            return Err(PluginLoadError::DirectoryNotFound(dir.to_path_buf()));
        }

        if !dir.is_dir() {
            return Err(PluginLoadError::NotADirectory(dir.to_path_buf()));
        }

        let mut candidates = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && self.matches_suffix(&path) {
                tracing::trace!(path = %path.display(), "Found plugin candidate");
                candidates.push(path);
            }
        }
        candidates.sort();

        tracing::debug!(
            count = candidates.len(),
            path = %dir.display(),
            "Discovered plugin candidates"
        );

        Ok(candidates)
    }

    fn matches_suffix(&self, path: &Path) -> bool {
        if self.suffixes.is_empty() {
            return true;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.suffixes
            .iter()
            .any(|suffix| name.len() > suffix.len() && name.ends_with(suffix.as_str()))
    }

    fn load_entry(&self, path: &Path) -> LoadOutcome {
        let key = normalize(path);
        if let Some(existing) = self.get(&key) {
            tracing::debug!(path = %key.display(), "Plugin already loaded");
            return LoadOutcome::AlreadyLoaded(existing);
        }

        match self.loader.load(&key) {
            Some(plugin) => LoadOutcome::Loaded(self.insert(key, plugin)),
            None => LoadOutcome::Skipped,
        }
    }

    fn insert(&self, key: PathBuf, plugin: Plugin) -> Arc<Plugin> {
        self.plugins
            .entry(key)
            .or_insert_with(|| Arc::new(plugin))
            .value()
            .clone()
    }

    /// Look up a plugin by path
    pub fn get(&self, path: impl AsRef<Path>) -> Option<Arc<Plugin>> {
        let key = normalize(path.as_ref());
        self.plugins.get(&key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.plugins.contains_key(&normalize(path.as_ref()))
    }

    /// Drop the registry's reference to one plugin. The module closes once
    /// no other holder remains.
    pub fn unload(&self, path: impl AsRef<Path>) -> bool {
        let key = normalize(path.as_ref());
        let removed = self.plugins.remove(&key).is_some();
        if removed {
            tracing::info!(path = %key.display(), "Unloaded plugin");
        }
        removed
    }

    /// Drop every plugin and clear the registry
    pub fn unload_all(&self) {
        let count = self.plugins.len();
        self.plugins.clear();
        tracing::info!(count, "Unloaded all plugins");
    }

    /// Snapshot of the registered plugins, sorted by path
    pub fn plugins(&self) -> Vec<Arc<Plugin>> {
        let mut plugins: Vec<Arc<Plugin>> = self.plugins.iter().map(|e| e.value().clone()).collect();
        plugins.sort_by(|a, b| a.path().cmp(b.path()));
        plugins
    }

    /// Visit every plugin without holding the registry lock
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Plugin),
    {
        for plugin in self.plugins() {
            f(plugin.as_ref());
        }
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Canonical form of `path`, or `path` itself when it cannot be resolved
/// (built-in pseudo paths, files that have disappeared).
fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
