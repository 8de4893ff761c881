//! Synchronous publish/subscribe embedded by composition into entities
use parking_lot::Mutex;
use std::sync::Arc;

pub trait Listener<E>: Send + Sync {
    fn on_change(&self, event: &E);
}

impl<E, F> Listener<E> for F
where
    F: Fn(&E) + Send + Sync,
{
    fn on_change(&self, event: &E) {
        self(event)
    }
}

/// Registry of listeners keyed by pointer identity.
pub struct NotificationHub<E> {
    listeners: Mutex<Vec<Arc<dyn Listener<E>>>>,
}

impl<E> Default for NotificationHub<E> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }
}

fn same_listener<E>(a: &Arc<dyn Listener<E>>, b: &Arc<dyn Listener<E>>) -> bool {
    // compare data pointers only, vtables may be duplicated across codegen units
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

impl<E> NotificationHub<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaching an already attached listener is a no-op.
    pub fn attach(&self, listener: Arc<dyn Listener<E>>) {
        let mut listeners = self.listeners.lock();
        if !listeners.iter().any(|l| same_listener(l, &listener)) {
            listeners.push(listener);
        }
    }

    pub fn detach(&self, listener: &Arc<dyn Listener<E>>) {
        self.listeners.lock().retain(|l| !same_listener(l, listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `event` to every listener in attach order. The registry lock
    /// is released before the first callback runs.
    pub fn broadcast(&self, event: &E) {
        let snapshot: Vec<_> = self.listeners.lock().iter().cloned().collect();
        for listener in snapshot {
            listener.on_change(event);
        }
    }
}

impl<E> std::fmt::Debug for NotificationHub<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHub")
            .field("listeners", &self.len())
            .finish()
    }
}
