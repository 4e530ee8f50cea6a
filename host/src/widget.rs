//! Widget configuration lookup
//!
//! Plugins and the host read installed-widget attributes (name, version,
//! install path, ...) by enumerated key. Where the values come from is not
//! the host's concern.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use widget_plugin_api::WidgetId;

/// Attribute keys of an installed widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigAttribute {
    Id,
    Name,
    Version,
    Author,
    InstallPath,
    StartFile,
    Locale,
}

impl std::fmt::Display for ConfigAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigAttribute::Id => write!(f, "id"),
            ConfigAttribute::Name => write!(f, "name"),
            ConfigAttribute::Version => write!(f, "version"),
            ConfigAttribute::Author => write!(f, "author"),
            ConfigAttribute::InstallPath => write!(f, "install_path"),
            ConfigAttribute::StartFile => write!(f, "start_file"),
            ConfigAttribute::Locale => write!(f, "locale"),
        }
    }
}

/// Attribute lookup by widget and key
pub trait WidgetConfigLookup: Send + Sync {
    fn attribute(&self, widget: WidgetId, key: ConfigAttribute) -> Option<String>;
}

/// In-memory attribute store
#[derive(Debug, Default)]
pub struct MemoryWidgetConfig {
    attributes: DashMap<(WidgetId, ConfigAttribute), String>,
}

impl MemoryWidgetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, widget: WidgetId, key: ConfigAttribute, value: impl Into<String>) -> Self {
        self.set(widget, key, value);
        self
    }

    pub fn set(&self, widget: WidgetId, key: ConfigAttribute, value: impl Into<String>) {
        self.attributes.insert((widget, key), value.into());
    }

    /// Forget every attribute of `widget`
    pub fn remove_widget(&self, widget: WidgetId) {
        self.attributes.retain(|(id, _), _| *id != widget);
    }
}

impl WidgetConfigLookup for MemoryWidgetConfig {
    fn attribute(&self, widget: WidgetId, key: ConfigAttribute) -> Option<String> {
        self.attributes.get(&(widget, key)).map(|v| v.value().clone())
    }
}
