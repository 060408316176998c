//! Per-connection message dispatcher.
//!
//! Handlers are registered per message identifier. Delivered messages are
//! queued and drained one at a time in FIFO order on a single drain task, so
//! handlers of one dispatcher never run concurrently with each other when
//! driven through [`Dispatcher::spawn_drain`].

use algol_protocol::Message;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Identifier whose handlers are invoked for every drained message.
pub const UNASSIGNED: &str = "Unassigned";

/// A message handler.
pub type MessageHandler = Arc<dyn Fn(&Message) + Send + Sync>;

struct DispatcherInner {
    handlers: Mutex<HashMap<String, Vec<MessageHandler>>>,
    queue: Mutex<VecDeque<Message>>,
    /// One tick per deferred delivery.
    ticks: mpsc::UnboundedSender<()>,
    tick_rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
}

/// Routes messages to handlers bound by identifier.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (ticks, tick_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(DispatcherInner {
                handlers: Mutex::new(HashMap::new()),
                queue: Mutex::new(VecDeque::new()),
                ticks,
                tick_rx: Mutex::new(Some(tick_rx)),
            }),
        }
    }

    /// Appends a handler for `identifier`. Handlers run in bind order.
    pub fn bind<F>(&self, identifier: impl Into<String>, handler: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.bind_handler(identifier, Arc::new(handler));
    }

    pub fn bind_handler(&self, identifier: impl Into<String>, handler: MessageHandler) {
        self.inner
            .handlers
            .lock()
            .entry(identifier.into())
            .or_default()
            .push(handler);
    }

    /// Clears the handlers bound to `identifier`. The entry itself is kept.
    pub fn unbind(&self, identifier: &str) {
        if let Some(list) = self.inner.handlers.lock().get_mut(identifier) {
            list.clear();
        }
    }

    /// Drops every registration.
    pub fn reset(&self) {
        self.inner.handlers.lock().clear();
    }

    /// Returns the number of handlers bound to `identifier`.
    pub fn handler_count(&self, identifier: &str) -> usize {
        self.inner
            .handlers
            .lock()
            .get(identifier)
            .map_or(0, Vec::len)
    }

    /// Returns whether `identifier` has an entry, even an empty one.
    pub fn is_registered(&self, identifier: &str) -> bool {
        self.inner.handlers.lock().contains_key(identifier)
    }

    /// Queues a copy of `msg`.
    ///
    /// With `immediate` set, one queued message is drained on the calling
    /// task before returning. Otherwise a drain step is scheduled on the drain
    /// task.
    pub fn deliver(&self, msg: &Message, immediate: bool) {
        self.inner.queue.lock().push_back(msg.clone());

        if immediate {
            self.dispatch_one();
        } else if self.inner.ticks.send(()).is_err() {
            tracing::trace!("drain task gone, '{}' left queued", msg.identifier);
        }
    }

    /// Pops the oldest queued message and runs its handlers, then the
    /// catch-all handlers. Returns false when the queue was empty.
    pub fn dispatch_one(&self) -> bool {
        let Some(msg) = self.inner.queue.lock().pop_front() else {
            return false;
        };

        // Handlers may bind, deliver or send; never hold the table lock while they run.
        let (specific, catch_all) = {
            let handlers = self.inner.handlers.lock();
            (
                handlers.get(&msg.identifier).cloned().unwrap_or_default(),
                handlers.get(UNASSIGNED).cloned().unwrap_or_default(),
            )
        };

        tracing::trace!(
            "dispatching '{}' to {} handler(s) + {} catch-all",
            msg.identifier,
            specific.len(),
            catch_all.len()
        );

        for handler in specific.iter().chain(catch_all.iter()) {
            handler(&msg);
        }
        true
    }

    /// Number of queued, undrained messages.
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Spawns the drain task. Each deferred delivery results in exactly one
    /// drain step. The task ends once every handle to this dispatcher is
    /// dropped.
    ///
    /// Returns `None` if the drain task was already spawned.
    pub fn spawn_drain(&self) -> Option<JoinHandle<()>> {
        let mut rx = self.inner.tick_rx.lock().take()?;
        let weak: Weak<DispatcherInner> = Arc::downgrade(&self.inner);

        Some(tokio::spawn(async move {
            while rx.recv().await.is_some() {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                Dispatcher { inner }.dispatch_one();
            }
        }))
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("identifiers", &self.inner.handlers.lock().len())
            .field("pending", &self.pending())
            .finish()
    }
}
