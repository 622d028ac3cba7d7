//! Push listeners and their per-class registry.
//!
//! A [`Listener`] is the application's end of a subscription: a bounded queue
//! of commands or notifications for one device. The service keeps one
//! [`ListenerRegistry`] per event class and at most one listener per device
//! in each.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Listener identifier, unique within one registry.
pub type ListenerId = u64;

/// Delivery into a listener that has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("listener closed")]
pub struct ListenerClosed;

struct ListenerInner<T> {
    id: ListenerId,
    key: String,
    sender: Mutex<Option<mpsc::Sender<T>>>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<T>>,
    closed: watch::Sender<bool>,
}

/// Receiving end of a subscription.
///
/// Cheap to clone; clones share one queue. Equality is identity, so a
/// listener compares equal only to clones of itself.
pub struct Listener<T> {
    inner: Arc<ListenerInner<T>>,
}

impl<T> Clone for Listener<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for Listener<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for Listener<T> {}

impl<T> fmt::Debug for Listener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T> Listener<T> {
    fn new(id: ListenerId, key: String, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (closed, _) = watch::channel(false);
        Self {
            inner: Arc::new(ListenerInner {
                id,
                key,
                sender: Mutex::new(Some(tx)),
                receiver: tokio::sync::Mutex::new(rx),
                closed,
            }),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.inner.id
    }

    /// Device id this listener is registered under.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Next item, or `None` once the listener is closed and drained.
    pub async fn recv(&self) -> Option<T> {
        self.inner.receiver.lock().await.recv().await
    }

    /// Next item if one is buffered.
    pub fn try_recv(&self) -> Option<T> {
        self.inner.receiver.try_lock().ok()?.try_recv().ok()
    }

    /// Queues `item`, waiting for room if the queue is full.
    ///
    /// Fails as soon as the listener is closed, including while waiting.
    pub async fn deliver(&self, item: T) -> Result<(), ListenerClosed> {
        let sender = self.inner.sender.lock().clone();
        let Some(tx) = sender else {
            return Err(ListenerClosed);
        };
        let closed = self.inner.closed.subscribe();
        if *closed.borrow() {
            return Err(ListenerClosed);
        }

        tokio::select! {
            biased;
            _ = wait_closed(closed) => Err(ListenerClosed),
            sent = tx.send(item) => sent.map_err(|_| ListenerClosed),
        }
    }

    /// Closes the queue. Buffered items stay readable; new deliveries fail.
    pub(crate) fn close(&self) {
        self.inner.sender.lock().take();
        self.inner.closed.send_replace(true);
    }
}

async fn wait_closed(mut closed: watch::Receiver<bool>) {
    while !*closed.borrow_and_update() {
        if closed.changed().await.is_err() {
            return;
        }
    }
}

/// Listeners of one event class, keyed by device id.
pub struct ListenerRegistry<T> {
    class: &'static str,
    listeners: Mutex<HashMap<String, Listener<T>>>,
    capacity: usize,
    next_id: AtomicU64,
}

impl<T> ListenerRegistry<T> {
    /// `class` names the event class in logs; `capacity` bounds each queue.
    pub fn new(class: &'static str, capacity: usize) -> Self {
        Self {
            class,
            listeners: Mutex::new(HashMap::new()),
            capacity,
            next_id: AtomicU64::new(1),
        }
    }

    /// Creates an unregistered listener for `key`.
    pub fn new_listener(&self, key: impl Into<String>) -> Listener<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Listener::new(id, key.into(), self.capacity)
    }

    pub fn find(&self, key: &str) -> Option<Listener<T>> {
        self.listeners.lock().get(key).cloned()
    }

    /// Registers `listener` unless its key is taken.
    ///
    /// Returns the registered listener and whether it is the one passed in.
    pub fn insert_if_absent(&self, listener: Listener<T>) -> (Listener<T>, bool) {
        let mut listeners = self.listeners.lock();
        if let Some(existing) = listeners.get(listener.key()) {
            return (existing.clone(), false);
        }
        listeners.insert(listener.key().to_string(), listener.clone());
        drop(listeners);

        debug!(
            class = self.class,
            device_id = %listener.key(),
            listener_id = listener.id(),
            "Registered listener"
        );
        (listener, true)
    }

    /// Removes and closes the listener for `key`. No-op when absent.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.listeners.lock().remove(key);
        match removed {
            Some(listener) => {
                listener.close();
                debug!(class = self.class, device_id = %key, "Removed listener");
                true
            }
            None => false,
        }
    }

    /// Removes and closes every listener. Returns how many there were.
    pub fn remove_all(&self) -> usize {
        let drained: Vec<_> = self.listeners.lock().drain().map(|(_, l)| l).collect();
        for listener in &drained {
            listener.close();
        }
        if !drained.is_empty() {
            debug!(class = self.class, count = drained.len(), "Removed all listeners");
        }
        drained.len()
    }

    /// True while `listener` itself is still registered under its key.
    pub fn contains_same(&self, listener: &Listener<T>) -> bool {
        self.listeners
            .lock()
            .get(listener.key())
            .is_some_and(|current| current == listener)
    }

    pub fn class(&self) -> &'static str {
        self.class
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }
}
