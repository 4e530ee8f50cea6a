//! Protected value handles
//!
//! [`ProtectedValue`] ties a script value to the lifetime of a Rust value.
//! What it does on construction and on drop depends only on its
//! [`Ownership`] tag:
//!
//! | Ownership         | On acquire | On release  |
//! |-------------------|------------|-------------|
//! | `SharedProtected` | protect    | unprotect   |
//! | `Owned`           | (adopted)  | unprotect   |
//! | `Unowned`         | nothing    | nothing     |
//!
//! All protection goes through the [`ValueLifetimeManager`], so a handle that
//! outlives its context releases into a no-op instead of a dangling context.

use std::sync::Arc;

use super::engine::{ContextRef, ValueRef};
use super::lifetime::ValueLifetimeManager;

/// How a handle participates in value protection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Takes over one protect reference that was acquired elsewhere
    Owned,
    /// Acquires its own protect reference
    SharedProtected,
    /// Borrows the value without protecting it
    Unowned,
}

impl Ownership {
    fn acquires(self) -> bool {
        matches!(self, Ownership::SharedProtected)
    }

    fn releases(self) -> bool {
        matches!(self, Ownership::Owned | Ownership::SharedProtected)
    }
}

/// A script value whose protection follows this handle's lifetime
pub struct ProtectedValue {
    manager: Arc<ValueLifetimeManager>,
    context: ContextRef,
    value: ValueRef,
    ownership: Ownership,
    // Whether this handle currently holds a reference to give back.
    held: bool,
}

impl ProtectedValue {
    pub fn new(manager: Arc<ValueLifetimeManager>, context: ContextRef, value: ValueRef, ownership: Ownership) -> Self {
        if ownership.acquires() {
            manager.protect(context, value);
        }

        Self {
            manager,
            context,
            value,
            ownership,
            held: ownership.releases(),
        }
    }

    /// Protect `value` for as long as the handle lives
    pub fn shared(manager: Arc<ValueLifetimeManager>, context: ContextRef, value: ValueRef) -> Self {
        Self::new(manager, context, value, Ownership::SharedProtected)
    }

    /// Take over a protect reference the caller already holds
    pub fn adopt(manager: Arc<ValueLifetimeManager>, context: ContextRef, value: ValueRef) -> Self {
        Self::new(manager, context, value, Ownership::Owned)
    }

    /// Refer to `value` without protecting it
    pub fn borrowed(manager: Arc<ValueLifetimeManager>, context: ContextRef, value: ValueRef) -> Self {
        Self::new(manager, context, value, Ownership::Unowned)
    }

    pub fn value(&self) -> ValueRef {
        self.value
    }

    pub fn context(&self) -> ContextRef {
        self.context
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Whether the handle holds a protect reference right now
    pub fn is_protected(&self) -> bool {
        self.held
    }

    /// Give the value back to the caller together with any protect reference
    /// the handle holds.
    pub fn into_raw(mut self) -> ValueRef {
        self.held = false;
        self.value
    }

    fn release(&mut self) {
        if std::mem::take(&mut self.held) {
            self.manager.unprotect(self.context, self.value);
        }
    }
}

impl Clone for ProtectedValue {
    /// Clones of protecting handles take their own reference.
    fn clone(&self) -> Self {
        let ownership = match self.ownership {
            Ownership::Unowned => Ownership::Unowned,
            Ownership::Owned | Ownership::SharedProtected => Ownership::SharedProtected,
        };
        Self::new(self.manager.clone(), self.context, self.value, ownership)
    }
}

impl Drop for ProtectedValue {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ProtectedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectedValue")
            .field("context", &self.context)
            .field("value", &self.value)
            .field("ownership", &self.ownership)
            .field("held", &self.held)
            .finish()
    }
}
