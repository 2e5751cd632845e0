//! Advisory locks keyed by an ID.
//!
//! Entries are created on first use and dropped again once nobody holds or
//! waits on them, so the map only ever contains keys that are in use.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct KeyedLocks<K> {
    entries: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with<T>(&self, key: K, f: impl FnOnce() -> T) -> T {
        let entry = lock(&self.entries).entry(key.clone()).or_default().clone();

        let result = {
            let _held = lock(&entry);
            f()
        };

        let mut entries = lock(&self.entries);
        // One reference in the map, one here: nobody else is waiting.
        if entries
            .get(&key)
            .is_some_and(|e| Arc::ptr_eq(e, &entry) && Arc::strong_count(e) == 2)
        {
            entries.remove(&key);
        }
        result
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_entries_are_dropped() {
        let locks = KeyedLocks::new();
        assert_eq!(locks.with(1_i64, || 42), 42);
        assert!(locks.is_empty());
    }

    #[test]
    fn test_same_key_serializes() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    locks.with(7_i64, || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }
}
