//! Packet dispatch table.
//!
//! Maps message identifiers to handlers with per-invocation fault
//! isolation: a handler that errors or panics is logged with its
//! identifier and never stops other messages from being delivered.
//! Applications keep one table per direction (host-bound and
//! client-bound); the type itself is direction-agnostic.

use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Error type handlers may return; logged, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type Handler<P> = Box<dyn FnMut(P) -> Result<(), HandlerError> + Send>;

/// Identifier -> handler mapping with fault isolation.
///
/// Handlers run inline on the dispatching caller. When handlers must
/// run with single-threaded affinity to shared state, move the table
/// onto a dedicated task with [`QueuedDispatcher::spawn`].
pub struct DispatchTable<I, P> {
    handlers: HashMap<I, Handler<P>>,
}

impl<I, P> DispatchTable<I, P>
where
    I: Copy + Eq + Hash + std::fmt::Debug,
{
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for `id`.
    ///
    /// Never overwrites: a duplicate registration keeps the first
    /// handler and logs a warning.
    pub fn register<F>(&mut self, id: I, handler: F)
    where
        F: FnMut(P) -> Result<(), HandlerError> + Send + 'static,
    {
        if self.handlers.contains_key(&id) {
            warn!(?id, "handler already registered, keeping the first");
            return;
        }
        self.handlers.insert(id, Box::new(handler));
    }

    /// Remove the handler for `id`. Warns and returns `false` if none
    /// was registered.
    pub fn deregister(&mut self, id: I) -> bool {
        if self.handlers.remove(&id).is_none() {
            warn!(?id, "no handler registered to deregister");
            return false;
        }
        true
    }

    /// Whether `id` has a handler.
    pub fn is_registered(&self, id: I) -> bool {
        self.handlers.contains_key(&id)
    }

    /// Invoke the handler for `id` with `payload`.
    ///
    /// Unknown identifiers are logged and ignored. A handler error or
    /// panic is logged with the identifier and contained; the table
    /// stays usable for every other message.
    pub fn dispatch(&mut self, id: I, payload: P) {
        let Some(handler) = self.handlers.get_mut(&id) else {
            warn!(?id, "no handler registered, dropping message");
            return;
        };
        match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(?id, error = %e, "message handler failed");
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                error!(?id, panic = %detail, "message handler panicked");
            }
        }
    }
}

impl<I, P> Default for DispatchTable<I, P>
where
    I: Copy + Eq + Hash + std::fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Handle that marshals dispatches onto one dedicated task.
///
/// Used when handlers need single-threaded affinity to shared game
/// state: the spawned task owns the table and drains the queue in
/// order, so handlers never run concurrently.
pub struct QueuedDispatcher<I, P> {
    tx: mpsc::UnboundedSender<(I, P)>,
}

impl<I, P> Clone for QueuedDispatcher<I, P> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<I, P> QueuedDispatcher<I, P>
where
    I: Copy + Eq + Hash + std::fmt::Debug + Send + 'static,
    P: Send + 'static,
{
    /// Move `table` onto a dedicated task and return the queueing
    /// handle plus the task handle.
    ///
    /// The task exits once every `QueuedDispatcher` clone is dropped.
    pub fn spawn(mut table: DispatchTable<I, P>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<(I, P)>();
        let task = tokio::spawn(async move {
            while let Some((id, payload)) = rx.recv().await {
                table.dispatch(id, payload);
            }
        });
        (Self { tx }, task)
    }

    /// Queue one message for dispatch. Returns `false` if the dispatch
    /// task has shut down.
    pub fn dispatch(&self, id: I, payload: P) -> bool {
        self.tx.send((id, payload)).is_ok()
    }
}
