//! Native plugin loading for the widget runtime
//!
//! Plugins are shared libraries exporting a fixed set of C symbols: widget
//! start/stop callbacks (required), optional init and frame callbacks, and a
//! class declaration table describing the script-visible objects they add.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Plugin Loading                           │
//! │  ModuleOpener ──▶ PluginLoader ──▶ PluginRegistry ──▶ ClassMap   │
//! │                                         │                        │
//! │                                         ▼                        │
//! │                                 LifecycleDispatcher              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use widget_plugin_host::plugin::{PluginLoader, PluginRegistry, LifecycleDispatcher};
//!
//! let registry = PluginRegistry::new(PluginLoader::default());
//! let summary = registry.load_directory("/usr/lib/wrt-plugins")?;
//! LifecycleDispatcher::new(&registry).widget_start(7);
//! ```

pub mod class;
pub mod class_map;
pub mod lifecycle;
pub mod loader;
pub mod module;
pub mod registry;

pub use class::{Class, ClassOptions, ClassTemplate, ClassTemplateHandle, ClassType, IframeNotice, IframeOption};
pub use class_map::{ClassEntry, ClassMap};
pub use lifecycle::{DispatchReport, FeatureMappingBuilder, FeatureMappingTable, LifecycleDispatcher, LifecycleEvent};
pub use loader::{Plugin, PluginCallbacks, PluginLoadError, PluginLoader};
pub use module::{DynamicLibrary, DynamicLibraryOpener, ForeignModule, ModuleOpener, StaticModule};
pub use registry::{LoadSummary, PluginRegistry, default_library_suffixes};
