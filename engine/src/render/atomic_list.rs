//! Lock-free append-only list with fixed capacity.
//!
//! CPU counterpart of the GPU "atomic counter + array" pattern used for the
//! unique-cluster list and the light index list. Appends reserve slots with a
//! single atomic update of the cursor; slots past capacity are rejected and
//! counted, never reallocated.
//!
//! The cursor saturates at capacity and the overflow count at `u32::MAX`, so
//! neither can wrap however many reservations a frame makes.

use std::sync::atomic::{AtomicU32, Ordering};

/// Fixed-capacity append list safe to push from many threads at once.
pub struct AtomicAppendList {
    slots: Vec<AtomicU32>,
    cursor: AtomicU32,
    overflow: AtomicU32,
}

impl AtomicAppendList {
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            slots: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            cursor: AtomicU32::new(0),
            overflow: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Append one value. Returns the slot written, or `None` when full.
    pub fn push(&self, value: u32) -> Option<u32> {
        let (slot, writable) = self.reserve(1);
        if writable == 0 {
            return None;
        }
        self.write(slot, value);
        Some(slot)
    }

    /// Reserve up to `count` consecutive slots with one atomic update.
    ///
    /// Returns `(start, writable)` where `writable ≤ count` is how many slots
    /// were granted. The shortfall is added to the overflow counter. Once the
    /// list is full `start` is the capacity and nothing is granted.
    pub fn reserve(&self, count: u32) -> (u32, u32) {
        if count == 0 {
            return (self.len(), 0);
        }
        let capacity = self.capacity();
        let reserved = self
            .cursor
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cursor| {
                (cursor < capacity).then(|| cursor + count.min(capacity - cursor))
            });
        let (start, writable) = match reserved {
            Ok(start) => (start, count.min(capacity - start)),
            Err(_) => (capacity, 0),
        };
        if writable < count {
            self.add_overflow(count - writable);
        }
        (start, writable)
    }

    fn add_overflow(&self, dropped: u32) {
        // The closure always returns Some, so the update cannot fail
        let _ = self
            .overflow
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_add(dropped)));
    }

    /// Write into a slot previously returned by [`Self::reserve`].
    #[inline]
    pub fn write(&self, slot: u32, value: u32) {
        if let Some(cell) = self.slots.get(slot as usize) {
            cell.store(value, Ordering::Relaxed);
        }
    }

    /// Number of slots handed out.
    #[inline]
    pub fn len(&self) -> u32 {
        self.cursor.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values rejected because the list was full.
    pub fn overflow(&self) -> u32 {
        self.overflow.load(Ordering::Acquire)
    }

    #[inline]
    pub fn get(&self, slot: u32) -> Option<u32> {
        if slot >= self.len() {
            return None;
        }
        self.slots.get(slot as usize).map(|cell| cell.load(Ordering::Relaxed))
    }

    /// Per-frame reset: rewinds the cursor and the overflow count.
    /// Slot contents are left as-is; only `[0, len)` is ever meaningful.
    pub fn reset(&mut self) {
        *self.cursor.get_mut() = 0;
        *self.overflow.get_mut() = 0;
    }

    /// Copy of the stored values in slot order.
    pub fn to_vec(&self) -> Vec<u32> {
        self.slots[..self.len() as usize]
            .iter()
            .map(|cell| cell.load(Ordering::Relaxed))
            .collect()
    }
}

impl std::fmt::Debug for AtomicAppendList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicAppendList")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("overflow", &self.overflow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_push_until_full() {
        let list = AtomicAppendList::with_capacity(2);
        assert_eq!(list.push(7), Some(0));
        assert_eq!(list.push(9), Some(1));
        assert_eq!(list.push(11), None);
        assert_eq!(list.len(), 2);
        assert_eq!(list.overflow(), 1);
        assert_eq!(list.to_vec(), vec![7, 9]);
    }

    #[test]
    fn test_reserve_partial() {
        let list = AtomicAppendList::with_capacity(5);
        assert_eq!(list.reserve(3), (0, 3));
        // Only two slots left
        assert_eq!(list.reserve(4), (3, 2));
        assert_eq!(list.overflow(), 2);
        // Fully past capacity
        assert_eq!(list.reserve(2), (5, 0));
        assert_eq!(list.overflow(), 4);
        assert_eq!(list.len(), 5);
    }

    #[test]
    fn test_huge_reservation_never_wraps() {
        let list = AtomicAppendList::with_capacity(8);
        assert_eq!(list.reserve(4), (0, 4));
        // Would wrap a plain u32 cursor back to 0
        assert_eq!(list.reserve(u32::MAX - 3), (4, 4));
        assert_eq!(list.reserve(2), (8, 0));
        assert_eq!(list.push(1), None);
        assert_eq!(list.len(), 8);
        assert_eq!(list.overflow(), (u32::MAX - 7) + 2 + 1);
    }

    #[test]
    fn test_overflow_count_saturates() {
        let list = AtomicAppendList::with_capacity(0);
        list.reserve(u32::MAX);
        list.reserve(u32::MAX);
        assert_eq!(list.overflow(), u32::MAX);
        assert!(list.is_empty());
    }

    #[test]
    fn test_reserve_zero_is_noop() {
        let list = AtomicAppendList::with_capacity(4);
        list.push(1);
        assert_eq!(list.reserve(0), (1, 0));
        assert_eq!(list.len(), 1);
        assert_eq!(list.overflow(), 0);
    }

    #[test]
    fn test_reset() {
        let mut list = AtomicAppendList::with_capacity(1);
        list.push(1);
        list.push(2);
        list.reset();
        assert!(list.is_empty());
        assert_eq!(list.overflow(), 0);
        assert_eq!(list.get(0), None);
    }

    #[test]
    fn test_parallel_push_no_lost_updates() {
        let list = AtomicAppendList::with_capacity(10_000);
        (0..10_000u32).into_par_iter().for_each(|v| {
            list.push(v);
        });
        assert_eq!(list.len(), 10_000);
        let mut values = list.to_vec();
        values.sort_unstable();
        assert!(values.iter().enumerate().all(|(i, v)| *v == i as u32));
    }
}
