//! Asynchronous event delivery
//!
//! Device operations run on per-domain worker threads ([`worker`]); their
//! answers travel back to script-bound listeners through emitters
//! ([`emitter`]); a request that is no longer wanted can be cancelled while
//! in flight ([`pending`]).

pub mod emitter;
pub mod pending;
pub mod worker;

pub use emitter::{Emitter, EmitterGuard, EmitterId, EmitterManager, ListenerEmitter, ListenerQueue, listener_channel};
pub use pending::{Answer, CancelHandler, OperationId, OperationState, PendingOperation, RequestDispatcher};
pub use worker::{WorkerPool, WorkerThread};

/// Errors from the worker and delivery layer
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Worker for domain '{0}' has stopped")]
    WorkerStopped(String),

    #[error("Failed to start worker for domain '{domain}': {source}")]
    Spawn {
        domain: String,
        #[source]
        source: std::io::Error,
    },
}
