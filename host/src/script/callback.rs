//! Success/error callback pairs
//!
//! Asynchronous device operations report back through a listener object
//! carrying `onsuccess` and `onerror` functions. [`CallbackPair`] protects
//! both functions while the operation is in flight and refuses to call into a
//! context that has since been released.

use std::sync::Arc;

use super::engine::{ContextRef, ObjectRef, ScriptError, ValueRef};
use super::handle::ProtectedValue;
use super::lifetime::ValueLifetimeManager;

pub const ON_SUCCESS: &str = "onsuccess";
pub const ON_ERROR: &str = "onerror";

#[derive(Debug, Clone)]
pub struct CallbackPair {
    manager: Arc<ValueLifetimeManager>,
    context: ContextRef,
    on_success: Option<ProtectedValue>,
    on_error: Option<ProtectedValue>,
}

impl CallbackPair {
    /// Protect the given callbacks. Null values are treated as absent.
    pub fn new(
        manager: Arc<ValueLifetimeManager>,
        context: ContextRef,
        on_success: Option<ValueRef>,
        on_error: Option<ValueRef>,
    ) -> Self {
        let protect = |value: Option<ValueRef>| {
            value
                .filter(|v| !v.is_null())
                .map(|v| ProtectedValue::shared(manager.clone(), context, v))
        };
        let on_success = protect(on_success);
        let on_error = protect(on_error);

        Self {
            manager,
            context,
            on_success,
            on_error,
        }
    }

    /// Read `onsuccess` / `onerror` from a listener object.
    pub fn from_listener(
        manager: Arc<ValueLifetimeManager>,
        context: ContextRef,
        listener: ObjectRef,
    ) -> Result<Self, ScriptError> {
        let engine = manager.engine().clone();
        let on_success = engine.get_property(context, listener, ON_SUCCESS)?;
        let on_error = engine.get_property(context, listener, ON_ERROR)?;
        Ok(Self::new(manager, context, Some(on_success), Some(on_error)))
    }

    pub fn context(&self) -> ContextRef {
        self.context
    }

    pub fn has_success(&self) -> bool {
        self.on_success.is_some()
    }

    pub fn has_error(&self) -> bool {
        self.on_error.is_some()
    }

    /// Call `onsuccess`. Returns `Ok(None)` when no callback was given.
    pub fn invoke_success(&self, arguments: &[ValueRef]) -> Result<Option<ValueRef>, ScriptError> {
        self.invoke(self.on_success.as_ref(), arguments)
    }

    /// Call `onerror`. Returns `Ok(None)` when no callback was given.
    pub fn invoke_error(&self, arguments: &[ValueRef]) -> Result<Option<ValueRef>, ScriptError> {
        self.invoke(self.on_error.as_ref(), arguments)
    }

    fn invoke(&self, callback: Option<&ProtectedValue>, arguments: &[ValueRef]) -> Result<Option<ValueRef>, ScriptError> {
        if !self.manager.is_context_valid(self.context) {
            return Err(ScriptError::ContextReleased);
        }

        let Some(callback) = callback else {
            return Ok(None);
        };

        self.manager
            .engine()
            .call_as_function(self.context, callback.value().as_object(), None, arguments)
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::mock::RecordingEngine;

    fn setup() -> (Arc<RecordingEngine>, Arc<ValueLifetimeManager>, ContextRef) {
        let engine = Arc::new(RecordingEngine::default());
        let manager = Arc::new(ValueLifetimeManager::new(engine.clone()));
        let ctx = ContextRef::from_addr(0x40);
        manager.add_global_context(ctx);
        (engine, manager, ctx)
    }

    #[test]
    fn test_from_listener_reads_both_callbacks() {
        let (engine, manager, ctx) = setup();
        let listener = ObjectRef::from_addr(0x500);
        engine.define(listener, ON_SUCCESS, ValueRef::from_addr(0x501));

        let pair = CallbackPair::from_listener(manager.clone(), ctx, listener).unwrap();
        assert!(pair.has_success());
        assert!(!pair.has_error());
        assert_eq!(manager.protect_count(ctx, ValueRef::from_addr(0x501)), 1);

        pair.invoke_success(&[ValueRef::from_addr(9)]).unwrap();
        assert_eq!(pair.invoke_error(&[]).unwrap(), None);
        assert_eq!(
            engine.calls(),
            vec![(ObjectRef::from_addr(0x501), vec![ValueRef::from_addr(9)])]
        );

        drop(pair);
        assert_eq!(manager.protect_count(ctx, ValueRef::from_addr(0x501)), 0);
    }

    #[test]
    fn test_invoke_after_release_is_refused() {
        let (engine, manager, ctx) = setup();
        let pair = CallbackPair::new(manager.clone(), ctx, Some(ValueRef::from_addr(0x601)), None);

        manager.release_context(ctx);

        assert_eq!(pair.invoke_success(&[]), Err(ScriptError::ContextReleased));
        assert!(engine.calls().is_empty());
    }
}
