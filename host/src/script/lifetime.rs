//! Value Lifetime Manager
//!
//! Reference counting over the engine's protect/unprotect primitives, scoped
//! by global context.
//!
//! # Ledger
//!
//! For every `(global context, value)` pair the manager keeps a protect count.
//! The engine is asked to protect a value on the 0 → 1 transition and to
//! unprotect it on 1 → 0, so the engine sees exactly one pin per live entry
//! no matter how many native holders share the value.
//!
//! # Valid contexts
//!
//! A global context becomes valid when it is registered with
//! [`add_global_context`] or first used to protect a value.
//! [`release_context`] force-unprotects everything still tracked for the
//! context and forgets it, after which unprotect calls for that context are
//! no-ops. Worker-thread completions that race a frame's
//! teardown rely on this.
//!
//! The ledger and the valid-context set share one mutex that every operation
//! holds for its full duration, engine calls included.
//!
//! [`add_global_context`]: ValueLifetimeManager::add_global_context
//! [`release_context`]: ValueLifetimeManager::release_context

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use super::engine::{ContextRef, GlobalContextRef, ScriptEngine, ValueRef};

#[derive(Default)]
struct Ledger {
    counts: HashMap<(GlobalContextRef, ValueRef), usize>,
    valid: HashSet<GlobalContextRef>,
}

/// Context-scoped protect counting
pub struct ValueLifetimeManager {
    engine: Arc<dyn ScriptEngine>,
    ledger: Mutex<Ledger>,
}

impl ValueLifetimeManager {
    pub fn new(engine: Arc<dyn ScriptEngine>) -> Self {
        Self {
            engine,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn engine(&self) -> &Arc<dyn ScriptEngine> {
        &self.engine
    }

    /// Register the global of `context` as alive. Returns `false` if it
    /// already was.
    pub fn add_global_context(&self, context: ContextRef) -> bool {
        let global = self.engine.global_context(context);
        let added = self.ledger.lock().valid.insert(global);
        if added {
            tracing::debug!(context = %global, "Registered global context");
        }
        added
    }

    pub fn is_context_valid(&self, context: ContextRef) -> bool {
        let global = self.engine.global_context(context);
        self.ledger.lock().valid.contains(&global)
    }

    /// Add one protect reference to `value`, registering the context's
    /// global if this is its first use.
    pub fn protect(&self, context: ContextRef, value: ValueRef) {
        let global = self.engine.global_context(context);
        let mut ledger = self.ledger.lock();

        if ledger.valid.insert(global) {
            tracing::debug!(context = %global, "Registered global context on first protect");
        }

        let count = ledger.counts.entry((global, value)).or_insert(0);
        if *count == 0 {
            self.engine.protect(global, value);
        }
        *count += 1;
    }

    /// Drop one protect reference to `value`.
    ///
    /// A no-op when the context has been released. Returns `true` when a
    /// tracked reference was dropped.
    pub fn unprotect(&self, context: ContextRef, value: ValueRef) -> bool {
        let global = self.engine.global_context(context);
        let mut ledger = self.ledger.lock();

        if !ledger.valid.contains(&global) {
            tracing::trace!(context = %global, value = %value, "Ignoring unprotect on a released context");
            return false;
        }

        let key = (global, value);
        let Some(count) = ledger.counts.get_mut(&key) else {
            tracing::warn!(context = %global, value = %value, "Unbalanced unprotect");
            return false;
        };

        *count -= 1;
        if *count == 0 {
            ledger.counts.remove(&key);
            self.engine.unprotect(global, value);
        }
        true
    }

    /// Tear down the global of `context`.
    ///
    /// Every value still tracked for it is unprotected exactly once,
    /// whatever its count, and the context is marked invalid. Callers must
    /// make sure nothing still holds a logical reference to those values.
    /// Returns the number of values released.
    pub fn release_context(&self, context: ContextRef) -> usize {
        let global = self.engine.global_context(context);
        let mut ledger = self.ledger.lock();

        let values: Vec<ValueRef> = ledger
            .counts
            .keys()
            .filter(|(ctx, _)| *ctx == global)
            .map(|(_, value)| *value)
            .collect();

        for value in &values {
            ledger.counts.remove(&(global, *value));
            self.engine.unprotect(global, *value);
        }

        let was_valid = ledger.valid.remove(&global);
        tracing::debug!(context = %global, released = values.len(), was_valid, "Released global context");

        values.len()
    }

    /// Current protect count of `value` under the global of `context`
    pub fn protect_count(&self, context: ContextRef, value: ValueRef) -> usize {
        let global = self.engine.global_context(context);
        self.ledger.lock().counts.get(&(global, value)).copied().unwrap_or(0)
    }

    /// Number of values tracked under the global of `context`
    pub fn tracked_values(&self, context: ContextRef) -> usize {
        let global = self.engine.global_context(context);
        self.ledger.lock().counts.keys().filter(|(ctx, _)| *ctx == global).count()
    }
}

impl std::fmt::Debug for ValueLifetimeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ledger = self.ledger.lock();
        f.debug_struct("ValueLifetimeManager")
            .field("tracked", &ledger.counts.len())
            .field("contexts", &ledger.valid.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::mock::RecordingEngine;

    fn setup() -> (Arc<RecordingEngine>, ValueLifetimeManager, ContextRef, GlobalContextRef) {
        let engine = Arc::new(RecordingEngine::default());
        let manager = ValueLifetimeManager::new(engine.clone());
        let ctx = ContextRef::from_addr(0x100);
        let global = GlobalContextRef::from_addr(0x100);
        manager.add_global_context(ctx);
        (engine, manager, ctx, global)
    }

    #[test]
    fn test_protect_unprotect_round_trip() {
        let (engine, manager, ctx, global) = setup();
        let value = ValueRef::from_addr(1);

        for _ in 0..5 {
            manager.protect(ctx, value);
        }
        assert_eq!(engine.protects(global, value), 1);
        assert_eq!(manager.protect_count(ctx, value), 5);

        for remaining in (1..5).rev() {
            manager.unprotect(ctx, value);
            assert_eq!(engine.unprotects(global, value), 0);
            assert_eq!(manager.protect_count(ctx, value), remaining);
        }

        manager.unprotect(ctx, value);
        assert_eq!(engine.unprotects(global, value), 1);
        assert_eq!(manager.tracked_values(ctx), 0);
    }

    #[test]
    fn test_child_contexts_share_global_ledger() {
        let (engine, manager, ctx, global) = setup();
        let child = ContextRef::from_addr(0x101);
        engine.set_global(child, global);
        let value = ValueRef::from_addr(2);

        manager.protect(ctx, value);
        manager.protect(child, value);
        assert_eq!(manager.protect_count(child, value), 2);
        assert_eq!(engine.protects(global, value), 1);
    }

    #[test]
    fn test_release_forces_single_unprotect() {
        let (engine, manager, ctx, global) = setup();
        let value = ValueRef::from_addr(3);

        manager.protect(ctx, value);
        manager.protect(ctx, value);
        manager.unprotect(ctx, value);

        assert_eq!(manager.release_context(ctx), 1);
        assert_eq!(engine.unprotects(global, value), 1);

        // Late completions after teardown are ignored.
        assert!(!manager.unprotect(ctx, value));
        assert_eq!(engine.unprotects(global, value), 1);
        assert!(!manager.is_context_valid(ctx));
    }

    #[test]
    fn test_release_only_touches_own_context() {
        let (engine, manager, ctx_a, global_a) = setup();
        let ctx_b = ContextRef::from_addr(0x200);
        let global_b = GlobalContextRef::from_addr(0x200);
        manager.add_global_context(ctx_b);
        let value = ValueRef::from_addr(4);

        manager.protect(ctx_a, value);
        manager.protect(ctx_b, value);
        manager.release_context(ctx_a);

        assert_eq!(engine.unprotects(global_a, value), 1);
        assert_eq!(engine.unprotects(global_b, value), 0);
        assert_eq!(manager.protect_count(ctx_b, value), 1);
    }

    #[test]
    fn test_first_protect_registers_context() {
        let engine = Arc::new(RecordingEngine::default());
        let manager = ValueLifetimeManager::new(engine.clone());
        let ctx = ContextRef::from_addr(0x300);
        let global = GlobalContextRef::from_addr(0x300);
        let value = ValueRef::from_addr(5);

        manager.protect(ctx, value);
        assert_eq!(engine.protects(global, value), 1);
        assert_eq!(manager.protect_count(ctx, value), 1);
        assert!(manager.is_context_valid(ctx));
        assert!(!manager.add_global_context(ctx));

        assert!(manager.unprotect(ctx, value));
        assert_eq!(engine.unprotects(global, value), 1);
    }

    #[test]
    fn test_protect_after_release_registers_again() {
        let (engine, manager, ctx, global) = setup();
        let value = ValueRef::from_addr(8);

        manager.protect(ctx, value);
        manager.release_context(ctx);
        assert!(!manager.is_context_valid(ctx));

        manager.protect(ctx, value);
        assert_eq!(engine.protects(global, value), 2);
        assert!(manager.is_context_valid(ctx));
    }

    #[test]
    fn test_unbalanced_unprotect_is_ignored() {
        let (engine, manager, ctx, global) = setup();
        let value = ValueRef::from_addr(6);
        assert!(!manager.unprotect(ctx, value));
        assert_eq!(engine.unprotects(global, value), 0);
    }

    #[test]
    fn test_concurrent_protect_unprotect() {
        let (engine, manager, ctx, global) = setup();
        let manager = Arc::new(manager);
        let value = ValueRef::from_addr(7);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        manager.protect(ctx, value);
                        manager.unprotect(ctx, value);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(manager.protect_count(ctx, value), 0);
        assert_eq!(engine.protects(global, value), engine.unprotects(global, value));
    }
}
