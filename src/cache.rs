//! Session-scoped identity map from parcel code to its single live handle
use super::parcel::ParcelHandle;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// At most one [`ParcelHandle`] exists per code for as long as the cache
/// lives. Listeners attached through one lookup path therefore hear about
/// writes made through any other.
#[derive(Default)]
pub struct EntityCache {
    entries: Mutex<HashMap<String, Arc<ParcelHandle>>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached handle for `code`, or builds one with `factory`,
    /// registers it and returns it. Check and insert happen under one lock.
    pub fn get_or_create<F>(&self, code: &str, factory: F) -> Arc<ParcelHandle>
    where
        F: FnOnce() -> ParcelHandle,
    {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(code) {
            tracing::trace!(code, "parcel cache hit");
            return Arc::clone(existing);
        }

        let handle = Arc::new(factory());
        entries.insert(code.to_string(), Arc::clone(&handle));
        tracing::trace!(code, "parcel cached");
        handle
    }

    pub fn get(&self, code: &str) -> Option<Arc<ParcelHandle>> {
        self.entries.lock().get(code).cloned()
    }

    /// Forgets `code`. Holders of the old handle keep it, but the next
    /// lookup builds a fresh one from the store.
    pub fn evict(&self, code: &str) -> Option<Arc<ParcelHandle>> {
        let evicted = self.entries.lock().remove(code);
        if evicted.is_some() {
            tracing::trace!(code, "parcel evicted");
        }
        evicted
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.lock().contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry. Only meant for a full session reset.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
