//! JSON report of a plugin scan
//!
//! Printed by the `scan` command so tooling can inspect which modules
//! implement the plugin ABI and which classes they declare.

use serde::Serialize;

use crate::plugin::{Class, ClassType, IframeNotice, IframeOption, LoadSummary, Plugin, PluginRegistry};

/// Result of `widget-plugin-host scan`
#[derive(Debug, Serialize)]
pub struct ScanReport {
    /// Loaded plugins, sorted by path
    pub plugins: Vec<PluginInfo>,
    pub summary: LoadSummary,
    /// Classes across all plugins
    pub total_classes: usize,
}

/// One loaded plugin
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub path: String,
    pub callbacks: CallbackInfo,
    /// Declared classes in table order
    pub classes: Vec<ClassInfo>,
}

/// Optional callbacks the plugin exports. Start and stop are always present.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CallbackInfo {
    pub widget_init: bool,
    pub frame_load: bool,
    pub frame_unload: bool,
}

/// One class declaration
#[derive(Debug, Clone, Serialize)]
pub struct ClassInfo {
    pub qualified_name: String,
    pub name: String,
    pub parent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    pub has_template: bool,
    pub has_constructor: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<OptionsInfo>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct OptionsInfo {
    pub class_type: ClassType,
    pub iframe_option: IframeOption,
    pub iframe_notice: IframeNotice,
}

impl ScanReport {
    pub fn new(registry: &PluginRegistry, summary: LoadSummary) -> Self {
        let plugins: Vec<PluginInfo> = registry.plugins().iter().map(|p| PluginInfo::from(p.as_ref())).collect();
        let total_classes = plugins.iter().map(|p| p.classes.len()).sum();

        Self {
            plugins,
            summary,
            total_classes,
        }
    }
}

impl From<&Plugin> for PluginInfo {
    fn from(plugin: &Plugin) -> Self {
        Self {
            path: plugin.path().display().to_string(),
            callbacks: CallbackInfo {
                widget_init: plugin.has_init(),
                frame_load: plugin.has_frame_load(),
                frame_unload: plugin.has_frame_unload(),
            },
            classes: plugin.classes().iter().map(ClassInfo::from).collect(),
        }
    }
}

impl From<&Class> for ClassInfo {
    fn from(class: &Class) -> Self {
        Self {
            qualified_name: class.qualified_name(),
            name: class.name().to_string(),
            parent: class.parent_name().to_string(),
            interface: class.interface_name().map(str::to_string),
            has_template: class.has_template(),
            has_constructor: class.constructor().is_some(),
            options: class.options().map(|options| OptionsInfo {
                class_type: options.class_type(),
                iframe_option: options.iframe_option(),
                iframe_notice: options.iframe_notice(),
            }),
        }
    }
}
