//! Recording engine used by unit tests

use std::collections::HashMap;

use parking_lot::Mutex;

use super::engine::{ContextRef, GlobalContextRef, ObjectRef, ScriptEngine, ScriptError, ValueRef};

#[derive(Default)]
pub(crate) struct RecordingEngine {
    globals: Mutex<HashMap<ContextRef, GlobalContextRef>>,
    protects: Mutex<HashMap<(GlobalContextRef, ValueRef), usize>>,
    unprotects: Mutex<HashMap<(GlobalContextRef, ValueRef), usize>>,
    properties: Mutex<HashMap<(ObjectRef, String), ValueRef>>,
    calls: Mutex<Vec<(ObjectRef, Vec<ValueRef>)>>,
}

impl RecordingEngine {
    /// Make `child` resolve to `global`
    pub(crate) fn set_global(&self, child: ContextRef, global: GlobalContextRef) {
        self.globals.lock().insert(child, global);
    }

    pub(crate) fn define(&self, object: ObjectRef, name: &str, value: ValueRef) {
        self.properties.lock().insert((object, name.to_string()), value);
    }

    pub(crate) fn protects(&self, global: GlobalContextRef, value: ValueRef) -> usize {
        self.protects.lock().get(&(global, value)).copied().unwrap_or(0)
    }

    pub(crate) fn unprotects(&self, global: GlobalContextRef, value: ValueRef) -> usize {
        self.unprotects.lock().get(&(global, value)).copied().unwrap_or(0)
    }

    pub(crate) fn calls(&self) -> Vec<(ObjectRef, Vec<ValueRef>)> {
        self.calls.lock().clone()
    }
}

impl ScriptEngine for RecordingEngine {
    fn global_context(&self, context: ContextRef) -> GlobalContextRef {
        self.globals
            .lock()
            .get(&context)
            .copied()
            .unwrap_or(GlobalContextRef::from_addr(context.addr()))
    }

    fn protect(&self, context: GlobalContextRef, value: ValueRef) {
        *self.protects.lock().entry((context, value)).or_default() += 1;
    }

    fn unprotect(&self, context: GlobalContextRef, value: ValueRef) {
        *self.unprotects.lock().entry((context, value)).or_default() += 1;
    }

    fn get_property(&self, _context: ContextRef, object: ObjectRef, name: &str) -> Result<ValueRef, ScriptError> {
        Ok(self
            .properties
            .lock()
            .get(&(object, name.to_string()))
            .copied()
            .unwrap_or(ValueRef::NULL))
    }

    fn set_property(
        &self,
        _context: ContextRef,
        object: ObjectRef,
        name: &str,
        value: ValueRef,
    ) -> Result<(), ScriptError> {
        self.define(object, name, value);
        Ok(())
    }

    fn call_as_function(
        &self,
        _context: ContextRef,
        function: ObjectRef,
        _this: Option<ObjectRef>,
        arguments: &[ValueRef],
    ) -> Result<ValueRef, ScriptError> {
        if function.is_null() {
            return Err(ScriptError::NotCallable);
        }
        self.calls.lock().push((function, arguments.to_vec()));
        Ok(ValueRef::NULL)
    }
}
