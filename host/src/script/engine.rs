//! Script Engine Boundary
//!
//! The host never looks inside script values. Everything it needs from the
//! engine (value protection, property access, calling functions) goes through
//! [`ScriptEngine`], and every engine object is carried as an opaque,
//! address-sized handle.

use std::ffi::c_void;

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(usize);

        impl $name {
            pub const NULL: Self = Self(0);

            pub fn from_ptr(ptr: *const c_void) -> Self {
                Self(ptr as usize)
            }

            pub fn from_addr(addr: usize) -> Self {
                Self(addr)
            }

            pub fn as_ptr(self) -> *const c_void {
                self.0 as *const c_void
            }

            pub fn addr(self) -> usize {
                self.0
            }

            pub fn is_null(self) -> bool {
                self.0 == 0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }
    };
}

opaque_handle!(
    /// A script execution context, usually belonging to one frame
    ContextRef
);

opaque_handle!(
    /// The root context that owns value lifetime bookkeeping
    GlobalContextRef
);

opaque_handle!(
    /// Any script value
    ValueRef
);

opaque_handle!(
    /// A script object
    ObjectRef
);

impl GlobalContextRef {
    /// The global context used as an ordinary execution context
    pub fn as_context(self) -> ContextRef {
        ContextRef(self.0)
    }
}

impl From<ObjectRef> for ValueRef {
    fn from(object: ObjectRef) -> Self {
        ValueRef(object.0)
    }
}

impl ValueRef {
    /// Reinterpret the value as an object. The engine decides whether it
    /// really is one when the object is used.
    pub fn as_object(self) -> ObjectRef {
        ObjectRef(self.0)
    }
}

/// Errors reported by script engine operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("Script context has been released")]
    ContextReleased,

    #[error("Value is not callable")]
    NotCallable,

    #[error("Script exception: {0}")]
    Exception(String),

    #[error("No script engine is attached")]
    Unavailable,
}

/// Primitives the host consumes from the embedded script engine.
///
/// Implementations must tolerate calls from worker threads; the host
/// serializes protect/unprotect itself but not property access.
pub trait ScriptEngine: Send + Sync {
    /// Root context of `context`. A context that is its own root maps to
    /// itself.
    fn global_context(&self, context: ContextRef) -> GlobalContextRef;

    /// Pin `value` against garbage collection
    fn protect(&self, context: GlobalContextRef, value: ValueRef);

    /// Undo one `protect`
    fn unprotect(&self, context: GlobalContextRef, value: ValueRef);

    fn get_property(&self, context: ContextRef, object: ObjectRef, name: &str) -> Result<ValueRef, ScriptError>;

    fn set_property(
        &self,
        context: ContextRef,
        object: ObjectRef,
        name: &str,
        value: ValueRef,
    ) -> Result<(), ScriptError>;

    fn call_as_function(
        &self,
        context: ContextRef,
        function: ObjectRef,
        this: Option<ObjectRef>,
        arguments: &[ValueRef],
    ) -> Result<ValueRef, ScriptError>;
}

/// Engine stand-in for running the host without a script runtime.
///
/// Every context is its own global, protection is a no-op and property or
/// call operations report [`ScriptError::Unavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEngine;

impl ScriptEngine for NullEngine {
    fn global_context(&self, context: ContextRef) -> GlobalContextRef {
        GlobalContextRef(context.0)
    }

    fn protect(&self, _context: GlobalContextRef, _value: ValueRef) {}

    fn unprotect(&self, _context: GlobalContextRef, _value: ValueRef) {}

    fn get_property(&self, _context: ContextRef, _object: ObjectRef, _name: &str) -> Result<ValueRef, ScriptError> {
        Err(ScriptError::Unavailable)
    }

    fn set_property(
        &self,
        _context: ContextRef,
        _object: ObjectRef,
        _name: &str,
        _value: ValueRef,
    ) -> Result<(), ScriptError> {
        Err(ScriptError::Unavailable)
    }

    fn call_as_function(
        &self,
        _context: ContextRef,
        _function: ObjectRef,
        _this: Option<ObjectRef>,
        _arguments: &[ValueRef],
    ) -> Result<ValueRef, ScriptError> {
        Err(ScriptError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_roundtrip_and_display() {
        let ctx = ContextRef::from_ptr(0x2a as *const c_void);
        assert_eq!(ctx.addr(), 0x2a);
        assert_eq!(ctx.as_ptr(), 0x2a as *const c_void);
        assert_eq!(ctx.to_string(), "0x2a");
        assert!(ValueRef::NULL.is_null());
    }

    #[test]
    fn test_object_value_conversion() {
        let object = ObjectRef::from_addr(7);
        let value = ValueRef::from(object);
        assert_eq!(value.as_object(), object);
    }

    #[test]
    fn test_null_engine() {
        let engine = NullEngine;
        let ctx = ContextRef::from_addr(5);
        assert_eq!(engine.global_context(ctx).as_context(), ctx);
        assert_eq!(
            engine.get_property(ctx, ObjectRef::from_addr(1), "onsuccess"),
            Err(ScriptError::Unavailable)
        );
    }
}
