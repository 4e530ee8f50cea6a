//! Class Declarations
//!
//! A plugin describes the script-visible entities it provides with a table of
//! [`RawClassDeclaration`](widget_plugin_api::RawClassDeclaration) records.
//! This module turns that table into owned [`Class`] descriptors.
//!
//! Options are parsed once and never change. A declaration without options is
//! legal to load, but asking such a class for an option is a contract
//! violation of the plugin and panics instead of inventing a default.

use std::ffi::{CStr, c_char, c_void};
use std::sync::OnceLock;

use serde::Serialize;
use widget_plugin_api as api;

/// Kind of entity a declaration exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassType {
    Class,
    Function,
    Interface,
}

impl TryFrom<u32> for ClassType {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            api::CLASS_TYPE_CLASS => Ok(ClassType::Class),
            api::CLASS_TYPE_FUNCTION => Ok(ClassType::Function),
            api::CLASS_TYPE_INTERFACE => Ok(ClassType::Interface),
            other => Err(other),
        }
    }
}

/// How an object behaves when a child iframe is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IframeOption {
    None,
    /// Deprecated: the iframe shares the parent's instance.
    Reference,
    CreateInstance,
}

impl TryFrom<u32> for IframeOption {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            api::IFRAME_OPTION_NONE => Ok(IframeOption::None),
            api::IFRAME_OPTION_REFERENCE => Ok(IframeOption::Reference),
            api::IFRAME_OPTION_CREATE_INSTANCE => Ok(IframeOption::CreateInstance),
            other => Err(other),
        }
    }
}

/// Whether the plugin wants to be told about iframe instantiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IframeNotice {
    None,
    AlwaysNotice,
}

impl TryFrom<u32> for IframeNotice {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            api::IFRAME_NOTICE_NONE => Ok(IframeNotice::None),
            api::IFRAME_NOTICE_ALWAYS => Ok(IframeNotice::AlwaysNotice),
            other => Err(other),
        }
    }
}

/// Engine class template, stored by address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassTemplateHandle(usize);

impl ClassTemplateHandle {
    pub fn from_ptr(ptr: *const c_void) -> Self {
        Self(ptr as usize)
    }

    pub fn as_ptr(self) -> *const c_void {
        self.0 as *const c_void
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Where a class gets its template from
#[derive(Debug)]
pub enum ClassTemplate {
    /// Template handle declared directly in the table
    Direct(ClassTemplateHandle),
    /// Template produced on first use by a plugin-supplied getter
    Getter {
        getter: api::ClassTemplateGetter,
        resolved: OnceLock<ClassTemplateHandle>,
    },
    /// Neither form was declared
    Absent,
}

/// Parsed, immutable class options
#[derive(Debug, Clone)]
pub struct ClassOptions {
    class_type: ClassType,
    iframe_option: IframeOption,
    iframe_notice: IframeNotice,
    private_data: usize,
    invoke_callback: Option<api::IframeNoticeCallback>,
    function: Option<api::FunctionCallback>,
}

impl ClassOptions {
    /// Parse options from the plugin's raw record.
    ///
    /// # Safety
    ///
    /// `raw` must be null or point to a valid `RawClassOptions`.
    ///
    /// # Panics
    ///
    /// Panics when `raw` is null or carries an enum value outside the ABI.
    /// Both mean the plugin shipped a malformed declaration.
    pub unsafe fn from_raw(raw: *const api::RawClassOptions) -> Self {
        // SAFETY: guaranteed by the caller.
        let raw = match unsafe { raw.as_ref() } {
            Some(raw) => raw,
            None => panic!("class options constructed from a null pointer"),
        };

        let class_type = ClassType::try_from(raw.class_type)
            .unwrap_or_else(|v| panic!("invalid class type {v} in class options"));
        let iframe_option = IframeOption::try_from(raw.iframe_option)
            .unwrap_or_else(|v| panic!("invalid iframe option {v} in class options"));
        let iframe_notice = IframeNotice::try_from(raw.iframe_notice)
            .unwrap_or_else(|v| panic!("invalid iframe notice {v} in class options"));

        Self {
            class_type,
            iframe_option,
            iframe_notice,
            private_data: raw.private_data as usize,
            invoke_callback: raw.invoke_callback,
            function: raw.function,
        }
    }

    pub fn class_type(&self) -> ClassType {
        self.class_type
    }

    pub fn iframe_option(&self) -> IframeOption {
        self.iframe_option
    }

    pub fn iframe_notice(&self) -> IframeNotice {
        self.iframe_notice
    }

    pub fn private_data(&self) -> *mut c_void {
        self.private_data as *mut c_void
    }

    pub fn invoke_callback(&self) -> Option<api::IframeNoticeCallback> {
        self.invoke_callback
    }

    pub fn function(&self) -> Option<api::FunctionCallback> {
        self.function
    }
}

/// One script-bindable entity declared by a plugin
#[derive(Debug)]
pub struct Class {
    name: String,
    parent_name: String,
    interface_name: Option<String>,
    template: ClassTemplate,
    constructor: Option<api::ConstructorCallback>,
    options: Option<ClassOptions>,
}

impl Class {
    /// Build a descriptor from one non-sentinel record.
    ///
    /// # Safety
    ///
    /// Every pointer in `raw` must be null or valid for the ABI type it is
    /// declared with.
    unsafe fn from_raw(raw: &api::RawClassDeclaration) -> Self {
        // SAFETY: guaranteed by the caller for the whole function body.
        unsafe {
            let template = match (raw.class_template.is_null(), raw.class_template_getter) {
                (false, getter) => {
                    if getter.is_some() {
                        tracing::warn!(
                            object = %c_string(raw.object_name).unwrap_or_default(),
                            "Class declares both a template and a template getter; using the template"
                        );
                    }
                    ClassTemplate::Direct(ClassTemplateHandle::from_ptr(raw.class_template))
                }
                (true, Some(getter)) => ClassTemplate::Getter {
                    getter,
                    resolved: OnceLock::new(),
                },
                (true, None) => ClassTemplate::Absent,
            };

            let options = if raw.options.is_null() {
                None
            } else {
                Some(ClassOptions::from_raw(raw.options))
            };

            Self {
                name: c_string(raw.object_name).unwrap_or_default(),
                parent_name: c_string(raw.parent_name).unwrap_or_default(),
                interface_name: c_string(raw.interface_name),
                template,
                constructor: raw.constructor,
                options,
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_name(&self) -> &str {
        &self.parent_name
    }

    pub fn interface_name(&self) -> Option<&str> {
        self.interface_name.as_deref()
    }

    /// `parent.name`, or just `name` for top-level entities
    pub fn qualified_name(&self) -> String {
        if self.parent_name.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.parent_name, self.name)
        }
    }

    pub fn constructor(&self) -> Option<api::ConstructorCallback> {
        self.constructor
    }

    pub fn has_template(&self) -> bool {
        !matches!(self.template, ClassTemplate::Absent)
    }

    /// Class template, calling the plugin's getter on first use.
    ///
    /// The getter lives in the plugin's module; callers must hold the owning
    /// plugin alive. A getter that yields null means no template.
    pub fn template(&self) -> Option<ClassTemplateHandle> {
        let handle = match &self.template {
            ClassTemplate::Direct(handle) => *handle,
            ClassTemplate::Getter { getter, resolved } => *resolved.get_or_init(|| {
                // SAFETY: the getter comes from a validated declaration table of
                // a module that is still loaded.
                ClassTemplateHandle::from_ptr(unsafe { getter() })
            }),
            ClassTemplate::Absent => return None,
        };
        (!handle.is_null()).then_some(handle)
    }

    /// Options, if the declaration carried any
    pub fn options(&self) -> Option<&ClassOptions> {
        self.options.as_ref()
    }

    fn required_options(&self) -> &ClassOptions {
        match &self.options {
            Some(options) => options,
            None => panic!("class `{}` was declared without options", self.qualified_name()),
        }
    }

    /// # Panics
    ///
    /// Panics when the class was declared without options.
    pub fn class_type(&self) -> ClassType {
        self.required_options().class_type()
    }

    /// # Panics
    ///
    /// Panics when the class was declared without options.
    pub fn iframe_option(&self) -> IframeOption {
        self.required_options().iframe_option()
    }

    /// # Panics
    ///
    /// Panics when the class was declared without options.
    pub fn iframe_notice(&self) -> IframeNotice {
        self.required_options().iframe_notice()
    }

    /// # Panics
    ///
    /// Panics when the class was declared without options.
    pub fn private_data(&self) -> *mut c_void {
        self.required_options().private_data()
    }

    /// # Panics
    ///
    /// Panics when the class was declared without options.
    pub fn invoke_callback(&self) -> Option<api::IframeNoticeCallback> {
        self.required_options().invoke_callback()
    }

    /// # Panics
    ///
    /// Panics when the class was declared without options.
    pub fn function(&self) -> Option<api::FunctionCallback> {
        self.required_options().function()
    }
}

/// Walk a declaration table up to its sentinel record.
///
/// A record whose parent and object names are both null or empty ends the
/// table. Descriptors are returned in table order. A null table yields an
/// empty list.
///
/// # Safety
///
/// `table` must be null or point to a sentinel-terminated array of valid
/// records.
pub unsafe fn parse_class_table(table: *const api::RawClassDeclaration) -> Vec<Class> {
    let mut classes = Vec::new();
    if table.is_null() {
        return classes;
    }

    let mut cursor = table;
    loop {
        // SAFETY: the table is sentinel-terminated, so `cursor` stays in
        // bounds until the sentinel is seen.
        let raw = unsafe { &*cursor };
        if unsafe { is_sentinel(raw) } {
            break;
        }
        classes.push(unsafe { Class::from_raw(raw) });
        cursor = unsafe { cursor.add(1) };
    }

    classes
}

unsafe fn is_sentinel(raw: &api::RawClassDeclaration) -> bool {
    unsafe { is_empty(raw.parent_name) && is_empty(raw.object_name) }
}

unsafe fn is_empty(ptr: *const c_char) -> bool {
    ptr.is_null() || unsafe { *ptr } == 0
}

unsafe fn c_string(ptr: *const c_char) -> Option<String> {
    if unsafe { is_empty(ptr) } {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static GETTER_CALLS: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn counting_getter() -> *const c_void {
        GETTER_CALLS.fetch_add(1, Ordering::SeqCst);
        0x1000 as *const c_void
    }

    static CLASS_OPTIONS: api::RawClassOptions = api::RawClassOptions::class()
        .with_iframe(api::IFRAME_OPTION_CREATE_INSTANCE, api::IFRAME_NOTICE_ALWAYS);

    #[test]
    fn test_parse_stops_at_sentinel_and_keeps_order() {
        let table = [
            api::RawClassDeclaration::new(c"tizen", c"filesystem").with_options(&CLASS_OPTIONS),
            api::RawClassDeclaration::new(c"tizen.filesystem", c"File"),
            api::RawClassDeclaration::new(c"", c"standalone"),
            api::RawClassDeclaration::SENTINEL,
            api::RawClassDeclaration::new(c"tizen", c"after_sentinel"),
        ];

        let classes = unsafe { parse_class_table(table.as_ptr()) };

        assert_eq!(classes.len(), 3);
        assert_eq!(classes[0].qualified_name(), "tizen.filesystem");
        assert_eq!(classes[1].qualified_name(), "tizen.filesystem.File");
        assert_eq!(classes[2].qualified_name(), "standalone");
        assert_eq!(classes[2].parent_name(), "");
    }

    #[test]
    fn test_empty_strings_terminate_like_null() {
        let table = [
            api::RawClassDeclaration::new(c"tizen", c"one"),
            api::RawClassDeclaration::new(c"", c""),
        ];
        let classes = unsafe { parse_class_table(table.as_ptr()) };
        assert_eq!(classes.len(), 1);
    }

    #[test]
    fn test_null_table_is_empty() {
        let classes = unsafe { parse_class_table(std::ptr::null()) };
        assert!(classes.is_empty());
    }

    #[test]
    fn test_options_are_decoded() {
        let table = [
            api::RawClassDeclaration::new(c"tizen", c"filesystem")
                .with_interface(c"FileSystemManager")
                .with_options(&CLASS_OPTIONS),
            api::RawClassDeclaration::SENTINEL,
        ];
        let classes = unsafe { parse_class_table(table.as_ptr()) };
        let class = &classes[0];

        assert_eq!(class.interface_name(), Some("FileSystemManager"));
        assert_eq!(class.class_type(), ClassType::Class);
        assert_eq!(class.iframe_option(), IframeOption::CreateInstance);
        assert_eq!(class.iframe_notice(), IframeNotice::AlwaysNotice);
        assert!(class.private_data().is_null());
        assert!(class.function().is_none());
    }

    #[test]
    #[should_panic(expected = "declared without options")]
    fn test_option_access_without_options_panics() {
        let table = [
            api::RawClassDeclaration::new(c"tizen", c"bare"),
            api::RawClassDeclaration::SENTINEL,
        ];
        let classes = unsafe { parse_class_table(table.as_ptr()) };
        assert!(classes[0].options().is_none());
        let _ = classes[0].class_type();
    }

    #[test]
    #[should_panic(expected = "null pointer")]
    fn test_options_from_null_pointer_panics() {
        let _ = unsafe { ClassOptions::from_raw(std::ptr::null()) };
    }

    #[test]
    #[should_panic(expected = "invalid class type")]
    fn test_options_with_unknown_type_panics() {
        let raw = api::RawClassOptions {
            class_type: 42,
            ..api::RawClassOptions::class()
        };
        let _ = unsafe { ClassOptions::from_raw(&raw) };
    }

    #[test]
    fn test_template_getter_is_called_once() {
        let table = [
            api::RawClassDeclaration::new(c"tizen", c"lazy").with_template_getter(counting_getter),
            api::RawClassDeclaration::SENTINEL,
        ];
        let classes = unsafe { parse_class_table(table.as_ptr()) };
        let class = &classes[0];

        assert!(class.has_template());
        let before = GETTER_CALLS.load(Ordering::SeqCst);
        let first = class.template().unwrap();
        let second = class.template().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.as_ptr(), 0x1000 as *const c_void);
        assert_eq!(GETTER_CALLS.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn test_direct_template_wins_over_getter() {
        let mut decl =
            api::RawClassDeclaration::new(c"tizen", c"both").with_template_getter(counting_getter);
        decl.class_template = 0x2000 as *const c_void;
        let table = [decl, api::RawClassDeclaration::SENTINEL];

        let classes = unsafe { parse_class_table(table.as_ptr()) };
        assert_eq!(classes[0].template().unwrap().as_ptr(), 0x2000 as *const c_void);
    }

    #[test]
    fn test_absent_template() {
        let table = [
            api::RawClassDeclaration::new(c"tizen", c"plain"),
            api::RawClassDeclaration::SENTINEL,
        ];
        let classes = unsafe { parse_class_table(table.as_ptr()) };
        assert!(!classes[0].has_template());
        assert!(classes[0].template().is_none());
    }

    unsafe extern "C" fn null_getter() -> *const c_void {
        std::ptr::null()
    }

    #[test]
    fn test_null_template_from_getter_is_none() {
        let table = [
            api::RawClassDeclaration::new(c"tizen", c"empty").with_template_getter(null_getter),
            api::RawClassDeclaration::SENTINEL,
        ];
        let classes = unsafe { parse_class_table(table.as_ptr()) };
        assert!(classes[0].has_template());
        assert!(classes[0].template().is_none());
        assert!(classes[0].template().is_none());
    }
}
