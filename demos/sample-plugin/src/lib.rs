//! Sample Plugin for the Widget Plugin Host
//!
//! Declares a `sample` namespace object under `tizen` and a `sample.echo`
//! function below it, and tracks which widgets are running and the features
//! each one was granted.
//!
//! # Building
//!
//! ```bash
//! cargo build --release -p widget-sample-plugin
//! ```
//!
//! Copy `target/release/libwidget_sample_plugin.so` into the configured
//! plugin directory:
//!
//! ```yaml
//! plugins:
//!   dir: /opt/widget/plugins
//! ```

use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::sync::Mutex;

use widget_plugin_api::{
    ClassTable, FeatureMapping, IFRAME_NOTICE_NONE, IFRAME_OPTION_CREATE_INSTANCE, JsContextRef,
    JsObjectRef, JsValueRef, RawClassDeclaration, RawClassOptions, WidgetId,
    export_widget_plugin,
};

static RUNNING_WIDGETS: Mutex<Option<HashSet<WidgetId>>> = Mutex::new(None);
static GRANTED_FEATURES: Mutex<Option<HashMap<WidgetId, Vec<String>>>> = Mutex::new(None);

fn on_start(widget_id: WidgetId) {
    if let Ok(mut widgets) = RUNNING_WIDGETS.lock() {
        widgets.get_or_insert_with(HashSet::new).insert(widget_id);
    }
}

fn on_stop(widget_id: WidgetId) {
    if let Ok(mut widgets) = RUNNING_WIDGETS.lock() {
        if let Some(widgets) = widgets.as_mut() {
            widgets.remove(&widget_id);
        }
    }
    if let Ok(mut granted) = GRANTED_FEATURES.lock() {
        if let Some(granted) = granted.as_mut() {
            granted.remove(&widget_id);
        }
    }
}

fn on_init(mapping: &FeatureMapping) {
    // SAFETY: the mapping is valid for the duration of the init callback.
    let names: Vec<String> = unsafe { mapping.features() }
        .iter()
        .map(|feature| unsafe { feature.name() }.to_string_lossy().into_owned())
        .collect();

    if let Ok(mut granted) = GRANTED_FEATURES.lock() {
        granted.get_or_insert_with(HashMap::new).insert(mapping.widget_id, names);
    }
}

/// Number of features granted to a running widget, `-1` if it is not running.
#[unsafe(no_mangle)]
pub extern "C" fn widget_sample_granted_features(widget_id: WidgetId) -> isize {
    let running = RUNNING_WIDGETS
        .lock()
        .map(|widgets| widgets.as_ref().is_some_and(|w| w.contains(&widget_id)))
        .unwrap_or(false);
    if !running {
        return -1;
    }

    GRANTED_FEATURES
        .lock()
        .ok()
        .and_then(|granted| granted.as_ref()?.get(&widget_id).map(Vec::len))
        .map_or(0, |count| count as isize)
}

fn on_frame_load(_context: JsContextRef) {}

unsafe extern "C" fn echo(
    _context: JsContextRef,
    _function: JsObjectRef,
    _this_object: JsObjectRef,
    argument_count: usize,
    arguments: *const JsValueRef,
    _exception: *mut JsValueRef,
) -> JsValueRef {
    if argument_count == 0 || arguments.is_null() {
        return std::ptr::null();
    }
    *arguments
}

unsafe extern "C" fn sample_template() -> *const c_void {
    std::ptr::null()
}

static SAMPLE_OPTIONS: RawClassOptions =
    RawClassOptions::class().with_iframe(IFRAME_OPTION_CREATE_INSTANCE, IFRAME_NOTICE_NONE);

static ECHO_OPTIONS: RawClassOptions = RawClassOptions::function(echo);

static CLASS_MAP: ClassTable<3> = ClassTable([
    RawClassDeclaration::new(c"tizen", c"sample")
        .with_interface(c"SampleManager")
        .with_template_getter(sample_template)
        .with_options(&SAMPLE_OPTIONS),
    RawClassDeclaration::new(c"tizen.sample", c"echo").with_options(&ECHO_OPTIONS),
    RawClassDeclaration::SENTINEL,
]);

export_widget_plugin! {
    start: on_start,
    stop: on_stop,
    init: on_init,
    frame_load: on_frame_load,
    class_map: CLASS_MAP,
}
