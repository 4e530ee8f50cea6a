pub mod config;
pub mod events;
pub mod host;
pub mod plugin;
pub mod report;
pub mod script;
pub mod security;
pub mod widget;

// Re-export commonly used items for convenience
pub use config::HostConfig;
pub use host::{HostError, PluginHost, PluginHostBuilder};
pub use plugin::{LifecycleDispatcher, Plugin, PluginLoader, PluginRegistry};
pub use script::ValueLifetimeManager;
