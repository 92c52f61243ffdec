//! Fixed-capacity history of per-step quantities.

use std::convert::Infallible;
use std::ops::Index;
use verode_core::{Result, VerodeError};

/// Ring buffer holding the last `capacity` values of a per-step quantity.
///
/// Elements are addressed by *lag*: lag 0 is the most recently pushed
/// value, lag 1 the one before it, and so on. Slots are allocated once at
/// construction and reused, so pushing never reallocates.
#[derive(Debug, Clone)]
pub struct FixedHistory<T> {
    slots: Vec<T>,
    /// Physical slot of lag 0
    head: usize,
    len: usize,
}

impl<T> FixedHistory<T> {
    /// Preallocate `capacity` slots using `fill`.
    ///
    /// # Panics
    /// If `capacity` is zero.
    pub fn from_fn(capacity: usize, fill: impl FnMut() -> T) -> Self {
        assert!(capacity > 0, "history capacity must be positive");
        let mut fill = fill;
        Self {
            slots: (0..capacity).map(|_| fill()).collect(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    fn physical(&self, lag: usize) -> usize {
        (self.head + lag) % self.capacity()
    }

    /// Move the head onto the oldest slot, which becomes lag 0
    fn rotate(&mut self) {
        let cap = self.capacity();
        self.head = (self.head + cap - 1) % cap;
        self.len = (self.len + 1).min(cap);
    }

    pub fn get(&self, lag: usize) -> Option<&T> {
        (lag < self.len).then(|| &self.slots[self.physical(lag)])
    }

    pub fn get_mut(&mut self, lag: usize) -> Option<&mut T> {
        if lag < self.len {
            let idx = self.physical(lag);
            Some(&mut self.slots[idx])
        } else {
            None
        }
    }

    /// Push a new value, evicting the oldest when full
    pub fn push(&mut self, value: T) {
        self.rotate();
        let head = self.head;
        self.slots[head] = value;
    }

    /// Evict the oldest slot and let `f` write the new newest value into it.
    ///
    /// If `f` fails the head is restored; a slot that was evicted from a
    /// full buffer stays out of the window since `f` may have clobbered it.
    pub fn cycle_evaluate<R, E>(
        &mut self,
        f: impl FnOnce(&mut T) -> std::result::Result<R, E>,
    ) -> std::result::Result<R, E> {
        let (head, len) = (self.head, self.len);
        self.rotate();
        let slot = self.head;
        match f(&mut self.slots[slot]) {
            Ok(r) => Ok(r),
            Err(e) => {
                self.head = head;
                self.len = len.min(self.capacity() - 1);
                Err(e)
            }
        }
    }

    /// Push by swapping; `value` receives the evicted slot's contents
    pub fn push_swap(&mut self, value: &mut T) {
        let outcome = self.cycle_evaluate(|slot| {
            std::mem::swap(slot, value);
            Ok::<(), Infallible>(())
        });
        match outcome {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }

    /// Values from newest to oldest
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).map(move |lag| &self.slots[self.physical(lag)])
    }

    /// Forget all values; slots keep their allocations
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

impl<T: Clone> FixedHistory<T> {
    /// Structural copy of head, length and contents
    pub fn copy_from(&mut self, other: &FixedHistory<T>) -> Result<()> {
        if self.capacity() != other.capacity() {
            return Err(VerodeError::DimensionMismatch {
                context: "history capacity",
                expected: self.capacity(),
                found: other.capacity(),
            });
        }
        self.slots.clone_from_slice(&other.slots);
        self.head = other.head;
        self.len = other.len;
        Ok(())
    }
}

impl<T> Index<usize> for FixedHistory<T> {
    type Output = T;

    fn index(&self, lag: usize) -> &T {
        self.get(lag)
            .unwrap_or_else(|| panic!("history lag {lag} out of range (len {})", self.len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_push_orders_newest_first() {
        let mut h = FixedHistory::from_fn(3, || 0);
        h.push(1);
        h.push(2);
        assert_eq!(h.len(), 2);
        assert_eq!(h[0], 2);
        assert_eq!(h[1], 1);
        assert_eq!(h.get(2), None);
    }

    #[test]
    fn test_eviction() {
        let mut h = FixedHistory::from_fn(2, || 0);
        for v in 1..=5 {
            h.push(v);
        }
        assert!(h.is_full());
        assert_eq!(h.iter().copied().collect::<Vec<_>>(), vec![5, 4]);
    }

    #[test]
    fn test_cycle_evaluate_writes_in_place() {
        let mut h = FixedHistory::from_fn(2, Vec::<i32>::new);
        h.push(vec![1]);
        h.push(vec![2]);
        h.cycle_evaluate(|slot| {
            // Evicted contents are reused
            assert_eq!(slot, &vec![1]);
            slot.clear();
            slot.push(3);
            Ok::<_, ()>(())
        })
        .unwrap();
        assert_eq!(h[0], vec![3]);
        assert_eq!(h[1], vec![2]);
    }

    #[test]
    fn test_cycle_evaluate_failure_restores_window() {
        let mut h = FixedHistory::from_fn(3, || 0);
        h.push(1);
        h.push(2);
        h.push(3);
        let err = h.cycle_evaluate(|slot| {
            *slot = 99;
            Err::<(), _>("boom")
        });
        assert_eq!(err, Err("boom"));
        // Newest values are intact, clobbered oldest is dropped
        assert_eq!(h.iter().copied().collect::<Vec<_>>(), vec![3, 2]);
    }

    #[test]
    fn test_push_swap_returns_evicted() {
        let mut h = FixedHistory::from_fn(1, || String::from("a"));
        h.push("b".to_string());
        let mut value = String::from("c");
        h.push_swap(&mut value);
        assert_eq!(h[0], "c");
        assert_eq!(value, "b");
    }

    #[test]
    fn test_copy_from() {
        let mut a = FixedHistory::from_fn(3, || 0);
        let mut b = FixedHistory::from_fn(3, || 0);
        for v in 1..=4 {
            a.push(v);
        }
        b.copy_from(&a).unwrap();
        assert_eq!(b.iter().collect::<Vec<_>>(), a.iter().collect::<Vec<_>>());

        let mut c = FixedHistory::from_fn(2, || 0);
        assert!(c.copy_from(&a).is_err());
    }

    proptest! {
        #[test]
        fn prop_keeps_last_capacity_elements(
            capacity in 1usize..8,
            values in proptest::collection::vec(any::<i64>(), 0..40),
        ) {
            let mut h = FixedHistory::from_fn(capacity, || 0i64);
            for &v in &values {
                h.push(v);
            }
            let expected: Vec<i64> = values.iter().rev().take(capacity).copied().collect();
            prop_assert_eq!(h.iter().copied().collect::<Vec<_>>(), expected);
            prop_assert_eq!(h.capacity(), capacity);
        }
    }
}
