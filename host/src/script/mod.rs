//! Script engine integration
//!
//! - [`engine`]: the engine boundary and opaque handles
//! - [`lifetime`]: context-scoped protect counting
//! - [`handle`]: ownership-tagged value handles
//! - [`callback`]: protected success/error callback pairs

pub mod callback;
pub mod engine;
pub mod handle;
pub mod lifetime;

#[cfg(test)]
pub(crate) mod mock;

pub use callback::CallbackPair;
pub use engine::{ContextRef, GlobalContextRef, NullEngine, ObjectRef, ScriptEngine, ScriptError, ValueRef};
pub use handle::{Ownership, ProtectedValue};
pub use lifetime::ValueLifetimeManager;
