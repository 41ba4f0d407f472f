//! Pooled, shareable resource handles keyed by resource identity.
//!
//! Opening a zip archive (or mapping a file) is expensive relative to
//! reading one entry, so scanner threads share open handles through a
//! `Recycler`. Construction is synchronized per key: two threads racing to
//! open the same archive construct it once, and the loser waits for and
//! reuses the winner's instance; threads opening different archives never
//! block each other. The pool is owned by one scan session and torn down
//! with it — there is no process-global state.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use once_cell::sync::OnceCell;

/// Resources that need an explicit release step beyond `Drop` (flushing,
/// unmapping a memory region) implement this; the recycler invokes it for
/// every pooled instance on `close()`.
pub trait Recyclable {
    fn recycle(&self) {}
}

pub struct Recycler<K, V> {
    /// Per-key compute-once slots. The outer lock is held only to find or
    /// insert a slot, never across construction.
    slots: Mutex<HashMap<K, Arc<OnceCell<Arc<V>>>>>,
    outstanding: AtomicUsize,
}

impl<K, V> Default for Recycler<K, V>
where
    K: Eq + Hash + Clone,
    V: Recyclable,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Recycler<K, V>
where
    K: Eq + Hash + Clone,
    V: Recyclable,
{
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Acquire the pooled instance for `key`, constructing it at most once
    /// via `factory`. The returned handle must be passed back to
    /// `release()` when done.
    pub fn acquire<F>(&self, key: &K, factory: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        let slot = {
            let mut slots = self.slots.lock().expect("recycler poisoned");
            slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        let instance = slot.get_or_try_init(|| factory().map(Arc::new))?;
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        Ok(instance.clone())
    }

    /// Return a handle to the idle set.
    pub fn release(&self, handle: Arc<V>) {
        drop(handle);
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
    }

    /// Handles acquired and not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }

    /// Recycle every pooled instance. Called once, after all workers have
    /// stopped; returns the number of handles still outstanding (should be
    /// zero by then).
    pub fn close(&self) -> usize {
        let mut slots = self.slots.lock().expect("recycler poisoned");
        for slot in slots.values() {
            if let Some(instance) = slot.get() {
                instance.recycle();
            }
        }
        slots.clear();
        self.outstanding.load(Ordering::Relaxed)
    }
}
