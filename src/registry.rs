//! Process-wide table routing native handle identities back to their
//! managed owners.
//!
//! The native callback signatures carry no user-data parameter, so the
//! trampolines have nothing but the handle pointer to identify the owning
//! wrapper. Keys are the pointer values themselves, treated as opaque
//! integers and never dereferenced. Entries are created lazily on first
//! handler registration and removed when the wrapper is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

pub(crate) struct Registry<T> {
    entries: Mutex<HashMap<usize, Arc<T>>>,
}

impl<T> Registry<T> {
    pub(crate) fn new() -> Self {
        Registry {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the entry for `key`, creating it with `make` if absent.
    /// Re-registering an existing key is a no-op and keeps the entry.
    pub(crate) fn register_with(&self, key: usize, make: impl FnOnce() -> T) -> Arc<T> {
        let mut entries = self.lock();
        entries.entry(key).or_insert_with(|| Arc::new(make())).clone()
    }

    /// Look up the owner of `key`. Unknown or removed keys yield `None`;
    /// the bridge treats that as "silently drop the event".
    pub(crate) fn lookup(&self, key: usize) -> Option<Arc<T>> {
        self.lock().get(&key).cloned()
    }

    pub(crate) fn remove(&self, key: usize) -> Option<Arc<T>> {
        self.lock().remove(&key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<usize, Arc<T>>> {
        // A panicking frame handler poisons the lock; the table itself is
        // still consistent, so keep dispatching.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_registered_owner() {
        let registry = Registry::new();
        let entry = registry.register_with(0x1000, || "owner");
        let found = registry.lookup(0x1000).unwrap();
        assert!(Arc::ptr_eq(&entry, &found));
    }

    #[test]
    fn register_is_idempotent() {
        let registry = Registry::new();
        let first = registry.register_with(0x2000, || 1u32);
        let second = registry.register_with(0x2000, || panic!("factory re-run"));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn lookup_of_unknown_key_is_none() {
        let registry: Registry<u32> = Registry::new();
        assert!(registry.lookup(0x3000).is_none());
    }

    #[test]
    fn removed_entries_are_gone() {
        let registry = Registry::new();
        registry.register_with(0x4000, || ());
        assert!(registry.remove(0x4000).is_some());
        assert!(registry.lookup(0x4000).is_none());
        assert!(registry.remove(0x4000).is_none());
    }
}
