//! Lifecycle Dispatcher
//!
//! Fans host lifecycle events out to every registered plugin.
//!
//! ```text
//!   widget start ──> widget init (feature mapping) ──> frame load ─┐
//!                                                                  │
//!   widget stop  <──────────────────────────────── frame unload <──┘
//! ```
//!
//! Dispatch is synchronous: every plugin has received the event when
//! [`LifecycleDispatcher::dispatch`] returns. Plugins that do not export the
//! callback for an event are skipped. Plugin code is trusted, so a fault inside
//! a callback is not caught here.

use std::ffi::{CString, c_char};

use serde::Serialize;
use widget_plugin_api::{FeatureDeviceCapabilities, FeatureMapping, WidgetId};

use super::registry::PluginRegistry;
use crate::script::ContextRef;

/// A host lifecycle event and its payload
#[derive(Debug, Clone, Copy)]
pub enum LifecycleEvent<'a> {
    WidgetStart(WidgetId),
    WidgetInit(&'a FeatureMapping),
    WidgetStop(WidgetId),
    FrameLoad(ContextRef),
    FrameUnload(ContextRef),
}

impl LifecycleEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::WidgetStart(_) => "widget_start",
            LifecycleEvent::WidgetInit(_) => "widget_init",
            LifecycleEvent::WidgetStop(_) => "widget_stop",
            LifecycleEvent::FrameLoad(_) => "frame_load",
            LifecycleEvent::FrameUnload(_) => "frame_unload",
        }
    }
}

impl std::fmt::Display for LifecycleEvent<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How many plugins an event reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub event: &'static str,
    /// Plugins whose callback was invoked
    pub delivered: usize,
    /// Plugins without a callback for this event
    pub skipped: usize,
}

/// Delivers lifecycle events to the plugins of a registry
pub struct LifecycleDispatcher<'a> {
    registry: &'a PluginRegistry,
}

impl<'a> LifecycleDispatcher<'a> {
    pub fn new(registry: &'a PluginRegistry) -> Self {
        Self { registry }
    }

    /// Deliver `event` to every registered plugin.
    pub fn dispatch(&self, event: LifecycleEvent<'_>) -> DispatchReport {
        let mut report = DispatchReport {
            event: event.name(),
            delivered: 0,
            skipped: 0,
        };

        self.registry.for_each(|plugin| {
            let delivered = match event {
                LifecycleEvent::WidgetStart(widget_id) => {
                    plugin.widget_start(widget_id);
                    true
                }
                LifecycleEvent::WidgetStop(widget_id) => {
                    plugin.widget_stop(widget_id);
                    true
                }
                LifecycleEvent::WidgetInit(mapping) => plugin.widget_init(mapping),
                LifecycleEvent::FrameLoad(context) => plugin.frame_load(context),
                LifecycleEvent::FrameUnload(context) => plugin.frame_unload(context),
            };

            if delivered {
                report.delivered += 1;
            } else {
                report.skipped += 1;
            }
        });

        tracing::debug!(
            event = %event,
            delivered = report.delivered,
            skipped = report.skipped,
            "Dispatched lifecycle event"
        );

        report
    }

    pub fn widget_start(&self, widget_id: WidgetId) -> DispatchReport {
        self.dispatch(LifecycleEvent::WidgetStart(widget_id))
    }

    pub fn widget_init(&self, mapping: &FeatureMappingTable) -> DispatchReport {
        self.dispatch(LifecycleEvent::WidgetInit(mapping.as_raw()))
    }

    pub fn widget_stop(&self, widget_id: WidgetId) -> DispatchReport {
        self.dispatch(LifecycleEvent::WidgetStop(widget_id))
    }

    pub fn frame_load(&self, context: ContextRef) -> DispatchReport {
        self.dispatch(LifecycleEvent::FrameLoad(context))
    }

    pub fn frame_unload(&self, context: ContextRef) -> DispatchReport {
        self.dispatch(LifecycleEvent::FrameUnload(context))
    }
}

/// Builds the feature mapping handed to widget init callbacks.
#[derive(Debug, Clone)]
pub struct FeatureMappingBuilder {
    widget_id: WidgetId,
    features: Vec<(CString, Vec<CString>)>,
}

impl FeatureMappingBuilder {
    pub fn new(widget_id: WidgetId) -> Self {
        Self {
            widget_id,
            features: Vec::new(),
        }
    }

    /// Grant `feature` the listed device capabilities.
    ///
    /// Names containing a NUL byte cannot cross the C boundary and are
    /// dropped with a warning.
    pub fn feature<I, S>(mut self, feature: &str, device_capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Ok(name) = CString::new(feature) else {
            tracing::warn!(feature, "Dropping feature with an embedded NUL");
            return self;
        };

        let capabilities = device_capabilities
            .into_iter()
            .filter_map(|cap| match CString::new(cap.as_ref()) {
                Ok(cap) => Some(cap),
                Err(_) => {
                    tracing::warn!(feature, capability = cap.as_ref(), "Dropping capability with an embedded NUL");
                    None
                }
            })
            .collect();

        self.features.push((name, capabilities));
        self
    }

    pub fn build(self) -> FeatureMappingTable {
        let capability_ptrs: Vec<Vec<*const c_char>> = self
            .features
            .iter()
            .map(|(_, caps)| caps.iter().map(|cap| cap.as_ptr()).collect())
            .collect();

        let entries: Vec<FeatureDeviceCapabilities> = self
            .features
            .iter()
            .zip(&capability_ptrs)
            .map(|((name, _), caps)| FeatureDeviceCapabilities {
                feature_name: name.as_ptr(),
                device_capabilities: if caps.is_empty() { std::ptr::null() } else { caps.as_ptr() },
                device_capability_count: caps.len(),
            })
            .collect();

        let mapping = FeatureMapping {
            widget_id: self.widget_id,
            features: if entries.is_empty() { std::ptr::null() } else { entries.as_ptr() },
            feature_count: entries.len(),
        };

        FeatureMappingTable {
            mapping,
            _entries: entries,
            _capability_ptrs: capability_ptrs,
            _features: self.features,
        }
    }
}

/// A feature mapping together with the storage it points into.
///
/// The raw mapping references heap buffers owned by this value, so it stays
/// valid for as long as the table lives, moves included.
#[derive(Debug)]
pub struct FeatureMappingTable {
    mapping: FeatureMapping,
    _entries: Vec<FeatureDeviceCapabilities>,
    _capability_ptrs: Vec<Vec<*const c_char>>,
    _features: Vec<(CString, Vec<CString>)>,
}

impl FeatureMappingTable {
    pub fn widget_id(&self) -> WidgetId {
        self.mapping.widget_id
    }

    pub fn len(&self) -> usize {
        self.mapping.feature_count
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.feature_count == 0
    }

    /// The C view passed to plugins
    pub fn as_raw(&self) -> &FeatureMapping {
        &self.mapping
    }
}
