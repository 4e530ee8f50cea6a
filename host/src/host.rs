//! Plugin host application object
//!
//! [`PluginHost`] owns one instance of every host service (plugin registry,
//! value lifetime manager, worker pool) together with the access control and
//! widget configuration collaborators, and drives the widget and frame
//! lifecycle across all loaded plugins.
//!
//! ```ignore
//! let host = PluginHost::builder(HostConfig::from_env()?).build()?;
//! host.load_plugins()?;
//! host.start_widget(7);
//! host.load_frame(context);
//! // ...
//! host.unload_frame(context);
//! host.release_context(context);
//! host.stop_widget(7);
//! host.shutdown();
//! ```

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use widget_plugin_api::WidgetId;

use crate::config::HostConfig;
use crate::events::{EventError, WorkerPool};
use crate::plugin::{
    ClassEntry, ClassMap, DispatchReport, DynamicLibraryOpener, FeatureMappingTable, ForeignModule, LifecycleDispatcher,
    LoadSummary, ModuleOpener, Plugin, PluginLoadError, PluginLoader, PluginRegistry,
};
use crate::script::{ContextRef, NullEngine, ScriptEngine, ValueLifetimeManager};
use crate::security::{AccessControl, AccessError, FunctionRequest, StaticAccessPolicy};
use crate::widget::{ConfigAttribute, MemoryWidgetConfig, WidgetConfigLookup};

/// Errors raised while building or loading the host
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Failed to load plugins: {0}")]
    Load(#[from] PluginLoadError),

    #[error("Failed to start workers: {0}")]
    Workers(#[from] EventError),
}

/// Assembles a [`PluginHost`] from configuration and collaborators.
pub struct PluginHostBuilder {
    config: HostConfig,
    opener: Arc<dyn ModuleOpener>,
    engine: Arc<dyn ScriptEngine>,
    access: Arc<dyn AccessControl>,
    widget_config: Arc<dyn WidgetConfigLookup>,
}

impl PluginHostBuilder {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            opener: Arc::new(DynamicLibraryOpener),
            engine: Arc::new(NullEngine),
            access: Arc::new(StaticAccessPolicy::allow_all()),
            widget_config: Arc::new(MemoryWidgetConfig::new()),
        }
    }

    /// Open plugin modules with `opener` instead of the dynamic loader
    pub fn opener(mut self, opener: Arc<dyn ModuleOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn engine(mut self, engine: Arc<dyn ScriptEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn access_control(mut self, access: Arc<dyn AccessControl>) -> Self {
        self.access = access;
        self
    }

    pub fn widget_config(mut self, widget_config: Arc<dyn WidgetConfigLookup>) -> Self {
        self.widget_config = widget_config;
        self
    }

    /// Create the host and start the configured worker threads.
    ///
    /// No plugin is loaded yet; call [`PluginHost::load_plugins`].
    pub fn build(self) -> Result<PluginHost, HostError> {
        let loader = PluginLoader::new(self.opener, self.config.verbose_load);
        let registry = PluginRegistry::new(loader).with_suffixes(self.config.library_suffixes.clone());
        let workers = WorkerPool::with_domains(&self.config.worker_domains)?;

        tracing::debug!(
            plugin_dir = ?self.config.plugin_dir,
            plugin_files = self.config.plugin_files.len(),
            workers = workers.len(),
            "Plugin host created"
        );

        Ok(PluginHost {
            config: self.config,
            registry,
            lifetime: Arc::new(ValueLifetimeManager::new(self.engine)),
            workers,
            access: self.access,
            widget_config: self.widget_config,
            class_map: RwLock::new(Arc::new(ClassMap::default())),
        })
    }
}

/// The widget runtime's plugin host
pub struct PluginHost {
    config: HostConfig,
    registry: PluginRegistry,
    lifetime: Arc<ValueLifetimeManager>,
    workers: WorkerPool,
    access: Arc<dyn AccessControl>,
    widget_config: Arc<dyn WidgetConfigLookup>,
    class_map: RwLock<Arc<ClassMap>>,
}

impl PluginHost {
    pub fn builder(config: HostConfig) -> PluginHostBuilder {
        PluginHostBuilder::new(config)
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Shared handle to the value lifetime manager, for handles and callbacks
    pub fn lifetime(&self) -> &Arc<ValueLifetimeManager> {
        &self.lifetime
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    pub fn widget_attribute(&self, widget: WidgetId, key: ConfigAttribute) -> Option<String> {
        self.widget_config.attribute(widget, key)
    }

    /// Load the configured plugin directory, then the configured file list.
    ///
    /// # Errors
    ///
    /// Fails when the configured directory cannot be enumerated. Individual
    /// modules that fail to load are only counted as skipped.
    pub fn load_plugins(&self) -> Result<LoadSummary, HostError> {
        let mut summary = LoadSummary::default();

        if let Some(dir) = &self.config.plugin_dir {
            summary.merge(self.registry.load_directory(dir)?);
        }
        if !self.config.plugin_files.is_empty() {
            summary.merge(self.registry.load_paths(&self.config.plugin_files));
        }

        self.refresh_class_map();

        tracing::info!(
            loaded = summary.loaded,
            skipped = summary.skipped,
            already_loaded = summary.already_loaded,
            plugins = self.registry.len(),
            "Plugins loaded"
        );

        Ok(summary)
    }

    /// Load a single module file outside the configured set.
    pub fn load_plugin(&self, path: impl AsRef<Path>) -> Option<Arc<Plugin>> {
        let plugin = self.registry.load_file(path);
        if plugin.is_some() {
            self.refresh_class_map();
        }
        plugin
    }

    /// Register a plugin linked into the host binary.
    pub fn load_builtin(&self, module: Box<dyn ForeignModule>) -> Option<Arc<Plugin>> {
        let plugin = self.registry.load_module(module);
        if plugin.is_some() {
            self.refresh_class_map();
        }
        plugin
    }

    /// Classes of every loaded plugin
    pub fn class_map(&self) -> Arc<ClassMap> {
        self.class_map.read().clone()
    }

    fn refresh_class_map(&self) {
        let map = ClassMap::from_registry(&self.registry);
        *self.class_map.write() = Arc::new(map);
    }

    fn dispatcher(&self) -> LifecycleDispatcher<'_> {
        LifecycleDispatcher::new(&self.registry)
    }

    pub fn start_widget(&self, widget_id: WidgetId) -> DispatchReport {
        let name = self.widget_config.attribute(widget_id, ConfigAttribute::Name);
        tracing::info!(widget_id, name = name.as_deref().unwrap_or("<unknown>"), "Starting widget");
        self.dispatcher().widget_start(widget_id)
    }

    /// Hand the widget's feature grants to every plugin
    pub fn init_widget(&self, mapping: &FeatureMappingTable) -> DispatchReport {
        tracing::debug!(widget_id = mapping.widget_id(), features = mapping.len(), "Initializing widget");
        self.dispatcher().widget_init(mapping)
    }

    pub fn stop_widget(&self, widget_id: WidgetId) -> DispatchReport {
        tracing::info!(widget_id, "Stopping widget");
        self.dispatcher().widget_stop(widget_id)
    }

    /// Register the frame's global context, then notify plugins.
    pub fn load_frame(&self, context: ContextRef) -> DispatchReport {
        self.lifetime.add_global_context(context);
        self.dispatcher().frame_load(context)
    }

    /// Notify plugins that a frame is going away.
    ///
    /// The context stays valid for value bookkeeping until
    /// [`release_context`](Self::release_context) is called.
    pub fn unload_frame(&self, context: ContextRef) -> DispatchReport {
        self.dispatcher().frame_unload(context)
    }

    /// Tear down value bookkeeping for `context`. Returns the number of
    /// values force-released.
    pub fn release_context(&self, context: ContextRef) -> usize {
        self.lifetime.release_context(context)
    }

    /// Authorize a device function declared by `class`.
    ///
    /// A class that no loaded plugin provides yields
    /// [`AccessError::Unavailable`] without consulting the access control.
    pub fn check_access(&self, widget: WidgetId, class: &str, request: &FunctionRequest) -> Result<(), AccessError> {
        if !self.class_map().get(class).is_some_and(ClassEntry::is_loaded) {
            tracing::debug!(widget, class, feature = %request.feature, "Feature class not provided by any plugin");
            return Err(AccessError::Unavailable {
                feature: request.feature.clone(),
            });
        }
        crate::security::check_access(self.access.as_ref(), widget, request)
    }

    /// Stop every worker and unload every plugin.
    pub fn shutdown(&self) {
        self.workers.shutdown();
        self.registry.unload_all();
        self.refresh_class_map();
        tracing::info!("Plugin host shut down");
    }
}

impl std::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHost")
            .field("plugins", &self.registry.len())
            .field("workers", &self.workers.domains())
            .field("lifetime", &self.lifetime)
            .finish()
    }
}
