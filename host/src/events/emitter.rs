//! Listener/Emitter Fan-out
//!
//! [`EmitterManager`] keeps the emitters attached by one consumer and
//! forwards events to them. Each emitter is identified by the address of its
//! allocation, so identities are unique among live emitters.
//!
//! # Locking
//!
//! The manager's lock is held for the whole of an [`emit`](EmitterManager::emit)
//! call. An emitter must not attach to or detach from its own manager while
//! it is being emitted to; doing so deadlocks. Batch operations can take the
//! lock once through [`EmitterManager::lock`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc;

/// A sink for events of type `E`
pub trait Emitter<E>: Send + Sync {
    fn emit(&self, event: &E);
}

/// Identity of an attached emitter, derived from its address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmitterId(usize);

impl EmitterId {
    pub fn of<E>(emitter: &Arc<dyn Emitter<E>>) -> Self {
        Self(Arc::as_ptr(emitter) as *const () as usize)
    }
}

impl std::fmt::Display for EmitterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

type EmitterMap<E> = HashMap<EmitterId, Arc<dyn Emitter<E>>>;

/// Registry of emitters for one event type
pub struct EmitterManager<E> {
    emitters: Mutex<EmitterMap<E>>,
}

impl<E> Default for EmitterManager<E> {
    fn default() -> Self {
        Self {
            emitters: Mutex::new(HashMap::new()),
        }
    }
}

impl<E> EmitterManager<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an emitter. Attaching the same emitter twice keeps one entry.
    pub fn attach(&self, emitter: Arc<dyn Emitter<E>>) -> EmitterId {
        self.lock().attach(emitter)
    }

    /// Detach an emitter. Returns `true` if it was attached.
    pub fn detach(&self, id: EmitterId) -> bool {
        self.lock().detach(id)
    }

    /// Send `event` to every attached emitter. Returns how many received it.
    pub fn emit(&self, event: &E) -> usize {
        self.lock().emit(event)
    }

    /// Send `event` to the attached emitters accepted by `predicate`.
    pub fn emit_if<P>(&self, event: &E, predicate: P) -> usize
    where
        P: FnMut(EmitterId, &dyn Emitter<E>) -> bool,
    {
        self.lock().emit_if(event, predicate)
    }

    /// Hold the manager's lock for a batch of operations.
    pub fn lock(&self) -> EmitterGuard<'_, E> {
        EmitterGuard {
            emitters: self.emitters.lock(),
        }
    }
}

/// Exclusive access to an [`EmitterManager`]
pub struct EmitterGuard<'a, E> {
    emitters: MutexGuard<'a, EmitterMap<E>>,
}

impl<E> EmitterGuard<'_, E> {
    pub fn attach(&mut self, emitter: Arc<dyn Emitter<E>>) -> EmitterId {
        let id = EmitterId::of(&emitter);
        self.emitters.insert(id, emitter);
        id
    }

    pub fn detach(&mut self, id: EmitterId) -> bool {
        self.emitters.remove(&id).is_some()
    }

    pub fn is_attached(&self, id: EmitterId) -> bool {
        self.emitters.contains_key(&id)
    }

    pub fn size(&self) -> usize {
        self.emitters.len()
    }

    pub fn emit(&self, event: &E) -> usize {
        self.emit_if(event, |_, _| true)
    }

    pub fn emit_if<P>(&self, event: &E, mut predicate: P) -> usize
    where
        P: FnMut(EmitterId, &dyn Emitter<E>) -> bool,
    {
        let mut delivered = 0;
        for (id, emitter) in self.emitters.iter() {
            if predicate(*id, emitter.as_ref()) {
                emitter.emit(event);
                delivered += 1;
            }
        }
        delivered
    }
}

/// Emitter that queues events for a listener on another thread
pub struct ListenerEmitter<E> {
    sender: mpsc::UnboundedSender<E>,
}

impl<E: Clone + Send> Emitter<E> for ListenerEmitter<E> {
    fn emit(&self, event: &E) {
        if self.sender.send(event.clone()).is_err() {
            tracing::trace!("Listener queue closed, dropping event");
        }
    }
}

/// Receiving end of a [`ListenerEmitter`], drained by the listener's thread
pub struct ListenerQueue<E> {
    receiver: mpsc::UnboundedReceiver<E>,
}

impl<E> ListenerQueue<E> {
    /// Next queued event, if any
    pub fn try_recv(&mut self) -> Option<E> {
        self.receiver.try_recv().ok()
    }

    /// Everything queued so far
    pub fn drain(&mut self) -> Vec<E> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }

    /// Block until an event arrives. Returns `None` once every emitter is
    /// gone. Must not be called from inside an async runtime.
    pub fn recv_blocking(&mut self) -> Option<E> {
        self.receiver.blocking_recv()
    }

    pub async fn recv(&mut self) -> Option<E> {
        self.receiver.recv().await
    }
}

/// Create a connected emitter/queue pair
pub fn listener_channel<E: Clone + Send + 'static>() -> (Arc<ListenerEmitter<E>>, ListenerQueue<E>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Arc::new(ListenerEmitter { sender }), ListenerQueue { receiver })
}
