//! # Slot Pool
//!
//! Reference-counted handle arena for objects mirrored into GPU arrays.
//!
//! Every created object gets a dense integer slot. The caller holds the
//! strong handle (`Arc<T>`); the pool itself keeps only a `Weak<T>` per
//! slot, so dropping the last strong handle is all it takes to release an
//! object. Expired slots are reclaimed by an explicit once-per-frame
//! [`SlotPool::purge_expired`] pass - never implicitly - which keeps slot
//! indices stable for anything the GPU may still be reading this frame.

use std::sync::{Arc, Weak};

/// A reference-counted handle arena with dense integer slots.
///
/// Slots freed by a purge are reused lowest-free-first; slots whose object
/// died since the last purge stay occupied until the next purge, so
/// [`SlotPool::required_storage_count`] always covers every slot the GPU
/// could still reference.
pub struct SlotPool<T> {
    /// One entry per slot ever used. `None` marks a purged (reusable) slot.
    slots: Vec<Option<Weak<T>>>,
    /// Slots reclaimed by `purge_expired`, available for reuse.
    free: Vec<u32>,
}

impl<T> SlotPool<T> {
    /// Creates an empty pool.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Allocates a slot and constructs `T` in place.
    ///
    /// The builder receives the slot index so the object can carry it (GPU
    /// records point back at objects by slot). Returns the strong handle;
    /// the pool keeps only a weak reference.
    pub fn create_with(&mut self, build: impl FnOnce(u32) -> T) -> Arc<T> {
        let slot = self.free.pop().unwrap_or_else(|| {
            self.slots.push(None);
            u32::try_from(self.slots.len() - 1).expect("slot pool exceeded u32 slot space")
        });
        let strong = Arc::new(build(slot));
        self.slots[slot as usize] = Some(Arc::downgrade(&strong));
        strong
    }

    /// Reclaims every slot whose weak reference has expired.
    ///
    /// Must be called exactly once per frame, before any code scans the
    /// pool for live entries. Returns the number of slots reclaimed.
    pub fn purge_expired(&mut self) -> usize {
        let mut reclaimed = 0;
        for (index, entry) in self.slots.iter_mut().enumerate() {
            let expired = matches!(entry, Some(weak) if weak.strong_count() == 0);
            if expired {
                *entry = None;
                self.free.push(index as u32);
                reclaimed += 1;
            }
        }
        reclaimed
    }

    /// Returns `highest slot ever used + 1`.
    ///
    /// GPU-visible parallel arrays must be sized by this value: it covers
    /// live slots *and* slots of dead-but-not-yet-purged objects that
    /// in-flight frames may still index.
    #[must_use]
    pub fn required_storage_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of currently live entries.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Upgrades the entry at `slot`, if it is still alive.
    #[must_use]
    pub fn get(&self, slot: u32) -> Option<Arc<T>> {
        self.slots.get(slot as usize)?.as_ref()?.upgrade()
    }

    /// Iterates over `(slot, weak handle)` pairs of unpurged entries.
    ///
    /// Callers must upgrade the weak handle before use; entries that died
    /// since the last purge yield `None` on upgrade.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Weak<T>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.as_ref().map(|weak| (index as u32, weak)))
    }
}

impl<T> Default for SlotPool<T> {
    fn default() -> Self {
        Self::new()
    }
}
