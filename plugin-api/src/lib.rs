//! # Widget Plugin API
//!
//! This crate defines the C ABI that native device-API plugins implement so the
//! widget plugin host can discover and drive them at runtime.
//!
//! # ABI
//!
//! A plugin is a shared library exporting a fixed set of symbols:
//!
//! | Symbol                      | Required | Signature                               |
//! |-----------------------------|----------|-----------------------------------------|
//! | `on_widget_start_callback`  | yes      | [`WidgetStartProc`]                     |
//! | `on_widget_init_callback`   | no       | [`WidgetInitProc`]                      |
//! | `on_widget_stop_callback`   | yes      | [`WidgetStopProc`]                      |
//! | `on_frame_load_callback`    | no       | [`FrameLoadProc`]                       |
//! | `on_frame_unload_callback`  | no       | [`FrameUnloadProc`]                     |
//! | `get_widget_class_map`      | one of   | [`GetClassMapProc`]                     |
//! | `dll_class_map`             | one of   | `[RawClassDeclaration]` array           |
//!
//! The class map is an array of [`RawClassDeclaration`] records terminated by
//! [`RawClassDeclaration::SENTINEL`]. Records are read in order, so a parent
//! object must be declared before the objects that attach under it.
//!
//! # Example Plugin
//!
//! ```rust,ignore
//! use widget_plugin_api::*;
//!
//! fn on_start(widget_id: WidgetId) { /* allocate per-widget state */ }
//! fn on_stop(widget_id: WidgetId) { /* release it */ }
//!
//! static CLASS_MAP: ClassTable<2> = ClassTable([
//!     RawClassDeclaration::new(c"tizen", c"filesystem"),
//!     RawClassDeclaration::SENTINEL,
//! ]);
//!
//! export_widget_plugin! {
//!     start: on_start,
//!     stop: on_stop,
//!     class_map: CLASS_MAP,
//! }
//! ```

use std::ffi::{CStr, c_char, c_int, c_void};

// =============================================================================
// Symbol names
// =============================================================================

/// Called once per widget instance when it starts.
pub const WIDGET_START_PROC: &CStr = c"on_widget_start_callback";

/// Called with the widget's feature mapping before the first frame loads.
pub const WIDGET_INIT_PROC: &CStr = c"on_widget_init_callback";

/// Called once per widget instance when it stops.
pub const WIDGET_STOP_PROC: &CStr = c"on_widget_stop_callback";

/// Called when a page frame gets a script context.
pub const FRAME_LOAD_PROC: &CStr = c"on_frame_load_callback";

/// Called before a page frame's script context goes away.
pub const FRAME_UNLOAD_PROC: &CStr = c"on_frame_unload_callback";

/// Getter form of the class declaration table.
pub const GET_CLASS_MAP_PROC: &CStr = c"get_widget_class_map";

/// Raw exported-array form of the class declaration table.
pub const CLASS_MAP: &CStr = c"dll_class_map";

// =============================================================================
// Handles and callback signatures
// =============================================================================

/// Widget instance identifier.
pub type WidgetId = c_int;

/// Opaque script context handle (a frame's execution context).
pub type JsContextRef = *const c_void;

/// Opaque script object handle.
pub type JsObjectRef = *const c_void;

/// Opaque script value handle.
pub type JsValueRef = *const c_void;

/// Opaque class template handle owned by the script engine.
pub type JsClassRef = *const c_void;

pub type WidgetStartProc = unsafe extern "C" fn(widget_id: WidgetId);
pub type WidgetInitProc = unsafe extern "C" fn(mapping: *mut FeatureMapping);
pub type WidgetStopProc = unsafe extern "C" fn(widget_id: WidgetId);
pub type FrameLoadProc = unsafe extern "C" fn(context: JsContextRef);
pub type FrameUnloadProc = unsafe extern "C" fn(context: JsContextRef);
pub type GetClassMapProc = unsafe extern "C" fn() -> *const RawClassDeclaration;

/// Lazily produces a class template for declarations that do not carry one.
pub type ClassTemplateGetter = unsafe extern "C" fn() -> JsClassRef;

/// Constructor invoked when script code does `new Object(...)`.
pub type ConstructorCallback = unsafe extern "C" fn(
    context: JsContextRef,
    constructor: JsObjectRef,
    argument_count: usize,
    arguments: *const JsValueRef,
    exception: *mut JsValueRef,
) -> JsObjectRef;

/// Body of a declaration of kind [`CLASS_TYPE_FUNCTION`].
pub type FunctionCallback = unsafe extern "C" fn(
    context: JsContextRef,
    function: JsObjectRef,
    this_object: JsObjectRef,
    argument_count: usize,
    arguments: *const JsValueRef,
    exception: *mut JsValueRef,
) -> JsValueRef;

/// Notifies a plugin that an object was instantiated inside an iframe.
pub type IframeNoticeCallback =
    unsafe extern "C" fn(context: JsContextRef, iframe: JsObjectRef, object: JsObjectRef);

// =============================================================================
// Class options
// =============================================================================

pub const CLASS_TYPE_CLASS: u32 = 0;
pub const CLASS_TYPE_FUNCTION: u32 = 1;
pub const CLASS_TYPE_INTERFACE: u32 = 2;

pub const IFRAME_OPTION_NONE: u32 = 0;
/// Deprecated: iframes share the parent's object.
pub const IFRAME_OPTION_REFERENCE: u32 = 1;
pub const IFRAME_OPTION_CREATE_INSTANCE: u32 = 2;

pub const IFRAME_NOTICE_NONE: u32 = 0;
pub const IFRAME_NOTICE_ALWAYS: u32 = 1;

/// Options attached to a class declaration.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawClassOptions {
    pub class_type: u32,
    pub iframe_option: u32,
    pub iframe_notice: u32,
    /// Plugin-private pointer handed back to the plugin untouched.
    pub private_data: *mut c_void,
    pub invoke_callback: Option<IframeNoticeCallback>,
    pub function: Option<FunctionCallback>,
}

// SAFETY: the host never dereferences `private_data`; it only hands it back to
// the plugin that declared it.
unsafe impl Sync for RawClassOptions {}

impl RawClassOptions {
    /// Options for a plain class with no iframe behaviour.
    pub const fn class() -> Self {
        Self {
            class_type: CLASS_TYPE_CLASS,
            iframe_option: IFRAME_OPTION_NONE,
            iframe_notice: IFRAME_NOTICE_NONE,
            private_data: std::ptr::null_mut(),
            invoke_callback: None,
            function: None,
        }
    }

    /// Options for a function object.
    pub const fn function(body: FunctionCallback) -> Self {
        Self {
            class_type: CLASS_TYPE_FUNCTION,
            function: Some(body),
            ..Self::class()
        }
    }

    pub const fn with_iframe(mut self, option: u32, notice: u32) -> Self {
        self.iframe_option = option;
        self.iframe_notice = notice;
        self
    }
}

// =============================================================================
// Class declarations
// =============================================================================

/// One record of a plugin's class declaration table.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawClassDeclaration {
    /// Object the declared entity attaches under (e.g. `"tizen"`).
    pub parent_name: *const c_char,
    /// Name of the declared entity.
    pub object_name: *const c_char,
    pub interface_name: *const c_char,
    pub class_template: JsClassRef,
    pub class_template_getter: Option<ClassTemplateGetter>,
    pub constructor: Option<ConstructorCallback>,
    pub options: *const RawClassOptions,
}

// SAFETY: every pointer in a declaration refers to immutable static data of the
// plugin that exported it.
unsafe impl Sync for RawClassDeclaration {}

impl RawClassDeclaration {
    /// Terminator record: parent and object names both null.
    pub const SENTINEL: Self = Self {
        parent_name: std::ptr::null(),
        object_name: std::ptr::null(),
        interface_name: std::ptr::null(),
        class_template: std::ptr::null(),
        class_template_getter: None,
        constructor: None,
        options: std::ptr::null(),
    };

    pub const fn new(parent_name: &'static CStr, object_name: &'static CStr) -> Self {
        Self {
            parent_name: parent_name.as_ptr(),
            object_name: object_name.as_ptr(),
            ..Self::SENTINEL
        }
    }

    pub const fn with_interface(mut self, interface_name: &'static CStr) -> Self {
        self.interface_name = interface_name.as_ptr();
        self
    }

    pub const fn with_template_getter(mut self, getter: ClassTemplateGetter) -> Self {
        self.class_template_getter = Some(getter);
        self
    }

    pub const fn with_constructor(mut self, constructor: ConstructorCallback) -> Self {
        self.constructor = Some(constructor);
        self
    }

    pub const fn with_options(mut self, options: &'static RawClassOptions) -> Self {
        self.options = options;
        self
    }
}

/// Fixed-size, sentinel-terminated class table suitable for a `static`.
#[repr(transparent)]
pub struct ClassTable<const N: usize>(pub [RawClassDeclaration; N]);

impl<const N: usize> ClassTable<N> {
    pub const fn as_ptr(&self) -> *const RawClassDeclaration {
        self.0.as_ptr()
    }
}

// =============================================================================
// Feature mapping
// =============================================================================

/// Device capabilities granted to one widget feature.
#[repr(C)]
#[derive(Debug)]
pub struct FeatureDeviceCapabilities {
    pub feature_name: *const c_char,
    pub device_capabilities: *const *const c_char,
    pub device_capability_count: usize,
}

/// Feature mapping handed to [`WidgetInitProc`]. Only valid during the call.
#[repr(C)]
#[derive(Debug)]
pub struct FeatureMapping {
    pub widget_id: WidgetId,
    pub features: *const FeatureDeviceCapabilities,
    pub feature_count: usize,
}

impl FeatureMapping {
    /// View the feature entries.
    ///
    /// # Safety
    ///
    /// `features` must point to `feature_count` valid entries, which holds for
    /// any mapping received through [`WidgetInitProc`] during the call.
    pub unsafe fn features(&self) -> &[FeatureDeviceCapabilities] {
        if self.features.is_null() || self.feature_count == 0 {
            return &[];
        }
        std::slice::from_raw_parts(self.features, self.feature_count)
    }
}

impl FeatureDeviceCapabilities {
    /// # Safety
    ///
    /// Same contract as [`FeatureMapping::features`].
    pub unsafe fn name(&self) -> &CStr {
        CStr::from_ptr(self.feature_name)
    }

    /// # Safety
    ///
    /// Same contract as [`FeatureMapping::features`].
    pub unsafe fn device_capabilities(&self) -> impl Iterator<Item = &CStr> {
        let caps: &[*const c_char] =
            if self.device_capabilities.is_null() || self.device_capability_count == 0 {
                &[]
            } else {
                std::slice::from_raw_parts(self.device_capabilities, self.device_capability_count)
            };
        caps.iter().map(|cap| CStr::from_ptr(*cap))
    }
}

// =============================================================================
// Export macro
// =============================================================================

/// Export the plugin ABI symbols from a Rust `cdylib`.
///
/// `start` and `stop` are required; `init`, `frame_load` and `frame_unload`
/// may be omitted, in which case the symbol is simply not exported.
#[macro_export]
macro_rules! export_widget_plugin {
    (
        start: $start:path,
        stop: $stop:path,
        $(init: $init:path,)?
        $(frame_load: $frame_load:path,)?
        $(frame_unload: $frame_unload:path,)?
        class_map: $class_map:expr $(,)?
    ) => {
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn on_widget_start_callback(widget_id: $crate::WidgetId) {
            $start(widget_id)
        }

        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn on_widget_stop_callback(widget_id: $crate::WidgetId) {
            $stop(widget_id)
        }

        $(
            #[unsafe(no_mangle)]
            pub unsafe extern "C" fn on_widget_init_callback(mapping: *mut $crate::FeatureMapping) {
                if let Some(mapping) = unsafe { mapping.as_ref() } {
                    $init(mapping)
                }
            }
        )?

        $(
            #[unsafe(no_mangle)]
            pub unsafe extern "C" fn on_frame_load_callback(context: $crate::JsContextRef) {
                $frame_load(context)
            }
        )?

        $(
            #[unsafe(no_mangle)]
            pub unsafe extern "C" fn on_frame_unload_callback(context: $crate::JsContextRef) {
                $frame_unload(context)
            }
        )?

        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn get_widget_class_map() -> *const $crate::RawClassDeclaration {
            $class_map.as_ptr()
        }
    };
}
