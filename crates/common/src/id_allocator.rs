//! Recycling allocator for mount identifiers
//!
//! Each volume gets a small non-negative integer which becomes the name of
//! its mountpoint directory (`<base>/<id>`). Freed identifiers are reused,
//! lowest first, so the mountpoint namespace stays compact.

use std::collections::BTreeSet;

use parking_lot::Mutex;

/// Thread-safe allocator of the smallest free non-negative integer
#[derive(Debug, Default)]
pub struct IdAllocator {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Every id below this has been handed out at least once
    next: u32,
    /// Ids below `next` that were freed and can be handed out again
    free: BTreeSet<u32>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the smallest identifier not currently outstanding
    pub fn allocate(&self) -> u32 {
        let mut inner = self.inner.lock();
        if let Some(id) = inner.free.pop_first() {
            return id;
        }
        let id = inner.next;
        inner.next = inner
            .next
            .checked_add(1)
            .expect("mount identifier space exhausted");
        id
    }

    /// Return an identifier to the pool
    ///
    /// # Panics
    ///
    /// Panics if `id` is not currently allocated. Freeing twice would let two
    /// live volumes share a mountpoint, so this is treated as fatal.
    pub fn free(&self, id: u32) {
        let mut inner = self.inner.lock();
        assert!(
            id < inner.next && !inner.free.contains(&id),
            "mount identifier {id} freed while not allocated"
        );

        // Shrink the high-water mark when the top ids come back so
        // `outstanding` stays cheap and the free set stays small.
        if id + 1 == inner.next {
            inner.next = id;
            while let Some(&top) = inner.free.last() {
                if top + 1 != inner.next {
                    break;
                }
                inner.free.pop_last();
                inner.next = top;
            }
        } else {
            inner.free.insert(id);
        }
    }

    /// Whether `id` is currently handed out
    pub fn is_allocated(&self, id: u32) -> bool {
        let inner = self.inner.lock();
        id < inner.next && !inner.free.contains(&id)
    }

    /// Number of identifiers currently handed out
    pub fn outstanding(&self) -> usize {
        let inner = self.inner.lock();
        inner.next as usize - inner.free.len()
    }
}
