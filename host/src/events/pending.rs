//! Pending operations
//!
//! A request posted to a device worker is tracked by a [`PendingOperation`].
//! Cancelling it does not stop the worker: the handler still runs to
//! completion, but its answer is discarded instead of being delivered.
//!
//! An operation settles exactly once, either as finished (the answer is
//! being delivered) or as cancelled. Whichever transition comes first wins.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use super::EventError;
use super::emitter::{EmitterId, EmitterManager};
use super::worker::WorkerThread;

/// Identifier of an in-flight request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl OperationId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Notified when a pending operation is cancelled
pub trait CancelHandler: Send + Sync {
    fn on_cancel_event(&self, id: OperationId);
}

/// Settlement state of a pending operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    Finished,
    Cancelled,
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationState::Pending => write!(f, "pending"),
            OperationState::Finished => write!(f, "finished"),
            OperationState::Cancelled => write!(f, "cancelled"),
        }
    }
}

const PENDING: u8 = 0;
const FINISHED: u8 = 1;
const CANCELLED: u8 = 2;

/// Cancellable handle to an in-flight request
pub struct PendingOperation {
    id: OperationId,
    state: AtomicU8,
    cancel_handler: Option<Arc<dyn CancelHandler>>,
}

impl PendingOperation {
    pub fn new(id: OperationId, cancel_handler: Option<Arc<dyn CancelHandler>>) -> Self {
        Self {
            id,
            state: AtomicU8::new(PENDING),
            cancel_handler,
        }
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn state(&self) -> OperationState {
        match self.state.load(Ordering::Acquire) {
            PENDING => OperationState::Pending,
            FINISHED => OperationState::Finished,
            _ => OperationState::Cancelled,
        }
    }

    /// Cancel the operation.
    ///
    /// Returns `false` if it had already finished or been cancelled. The
    /// cancel handler runs only for the call that actually cancelled.
    pub fn cancel(&self) -> bool {
        if !self.settle(CANCELLED) {
            return false;
        }

        tracing::debug!(operation = %self.id, "Operation cancelled");
        if let Some(handler) = &self.cancel_handler {
            handler.on_cancel_event(self.id);
        }
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == OperationState::Cancelled
    }

    pub fn is_finished(&self) -> bool {
        self.state() == OperationState::Finished
    }

    /// Claim the right to deliver the answer
    pub(crate) fn try_finish(&self) -> bool {
        self.settle(FINISHED)
    }

    fn settle(&self, to: u8) -> bool {
        self.state
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl std::fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingOperation")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Result of a request, delivered to the requesting emitter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer<T> {
    pub operation_id: OperationId,
    pub payload: T,
}

type RequestHandler<Req, Ans> = Arc<dyn Fn(Req) -> Ans + Send + Sync>;

/// Runs requests on a domain worker and routes each answer back to the
/// emitter that asked for it.
pub struct RequestDispatcher<Req, Ans> {
    worker: Arc<WorkerThread>,
    emitters: Arc<EmitterManager<Answer<Ans>>>,
    handler: RequestHandler<Req, Ans>,
    cancel_handler: Option<Arc<dyn CancelHandler>>,
    next_id: AtomicU64,
}

impl<Req, Ans> RequestDispatcher<Req, Ans>
where
    Req: Send + 'static,
    Ans: Send + 'static,
{
    pub fn new<H>(worker: Arc<WorkerThread>, emitters: Arc<EmitterManager<Answer<Ans>>>, handler: H) -> Self
    where
        H: Fn(Req) -> Ans + Send + Sync + 'static,
    {
        Self {
            worker,
            emitters,
            handler: Arc::new(handler),
            cancel_handler: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// Handler notified for every operation cancelled from now on
    pub fn with_cancel_handler(mut self, handler: Arc<dyn CancelHandler>) -> Self {
        self.cancel_handler = Some(handler);
        self
    }

    pub fn emitters(&self) -> &Arc<EmitterManager<Answer<Ans>>> {
        &self.emitters
    }

    /// Post `request` to the worker. Its answer goes to `target` unless the
    /// returned operation is cancelled first.
    pub fn post(&self, request: Req, target: EmitterId) -> Result<Arc<PendingOperation>, EventError> {
        let id = OperationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let operation = Arc::new(PendingOperation::new(id, self.cancel_handler.clone()));

        let pending = operation.clone();
        let emitters = self.emitters.clone();
        let handler = self.handler.clone();
        let domain = self.worker.domain().to_string();

        self.worker.post(move || {
            let payload = handler(request);

            if !pending.try_finish() {
                tracing::debug!(domain = %domain, operation = %id, "Discarding answer of cancelled operation");
                return;
            }

            let answer = Answer {
                operation_id: id,
                payload,
            };
            let delivered = emitters.emit_if(&answer, |emitter, _| emitter == target);
            if delivered == 0 {
                tracing::debug!(domain = %domain, operation = %id, target = %target, "Answer target is no longer attached");
            }
        })?;

        Ok(operation)
    }
}
