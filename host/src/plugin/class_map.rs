//! Class Map
//!
//! Merges the class declarations of every registered plugin into one lookup
//! table keyed by qualified name (`parent.name`). This is what the script
//! binding layer walks to build the object tree.
//!
//! Within a plugin, declarations keep their table order so that a parent is
//! always seen before its children. Plugins are merged in registry order
//! (sorted by path); no cross-plugin ordering is promised beyond that.
//!
//! Entries refer to their plugin weakly. A map never keeps a module open:
//! once the registry drops a plugin its entries stop resolving.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use super::class::Class;
use super::loader::Plugin;
use super::registry::PluginRegistry;

/// A class together with the plugin that declared it
#[derive(Debug, Clone)]
pub struct ClassEntry {
    plugin: Weak<Plugin>,
    path: PathBuf,
    index: usize,
    qualified_name: String,
    parent_name: String,
}

impl ClassEntry {
    /// The declaring plugin, or `None` once it has been unloaded
    pub fn plugin(&self) -> Option<Arc<Plugin>> {
        self.plugin.upgrade()
    }

    pub fn is_loaded(&self) -> bool {
        self.plugin.strong_count() > 0
    }

    /// Run `f` against the class declaration while its plugin is loaded.
    pub fn with_class<R>(&self, f: impl FnOnce(&Class) -> R) -> Option<R> {
        let plugin = self.plugin.upgrade()?;
        plugin.classes().get(self.index).map(f)
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn parent_name(&self) -> &str {
        &self.parent_name
    }

    /// Path of the declaring plugin
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Position of the class in its plugin's table
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Qualified-name index over every registered plugin's classes
#[derive(Debug, Default)]
pub struct ClassMap {
    entries: Vec<ClassEntry>,
    by_name: HashMap<String, usize>,
}

impl ClassMap {
    /// Build the map from a registry snapshot.
    ///
    /// When two declarations share a qualified name the first one wins and
    /// the later one is reported.
    pub fn from_registry(registry: &PluginRegistry) -> Self {
        let mut map = Self::default();
        for plugin in registry.plugins() {
            map.extend_from_plugin(&plugin);
        }

        tracing::debug!(classes = map.len(), "Built class map");
        map
    }

    fn extend_from_plugin(&mut self, plugin: &Arc<Plugin>) {
        for (index, class) in plugin.classes().iter().enumerate() {
            let name = class.qualified_name();
            if let Some(&existing) = self.by_name.get(&name) {
                tracing::warn!(
                    class = %name,
                    path = %plugin.path().display(),
                    declared_by = %self.entries[existing].path.display(),
                    "Ignoring duplicate class declaration"
                );
                continue;
            }

            self.by_name.insert(name.clone(), self.entries.len());
            self.entries.push(ClassEntry {
                plugin: Arc::downgrade(plugin),
                path: plugin.path().to_path_buf(),
                index,
                qualified_name: name,
                parent_name: class.parent_name().to_string(),
            });
        }
    }

    /// Look up a class by qualified name, e.g. `tizen.filesystem`
    pub fn get(&self, qualified_name: &str) -> Option<&ClassEntry> {
        self.by_name.get(qualified_name).map(|&i| &self.entries[i])
    }

    /// Classes declared directly under `parent`, in declaration order
    pub fn children_of<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a ClassEntry> + 'a {
        self.entries
            .iter()
            .filter(move |entry| entry.parent_name == parent)
    }

    /// All classes in merge order
    pub fn iter(&self) -> impl Iterator<Item = &ClassEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
