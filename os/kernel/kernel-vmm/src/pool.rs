//! # Fixed-Capacity Object Pool
//!
//! Supplies interval records to the range allocator without going through a
//! heap. The allocator that hands out virtual ranges cannot itself depend on
//! an allocator that might need virtual ranges, so the backing store is a
//! plain array of `N` slots embedded in the owner.
//!
//! Records are addressed by a stable [`Handle`]; the trees and lists of the
//! allocator store handles instead of references.
//!
//! ```text
//!  slots: [ Occupied | Vacant ─┐ | Occupied | Vacant ─┐ | Unused | Unused ]
//!                     ▲        │              ▲        │   ▲
//!           free_head ┘        └── next ──────┘        ┘   └ next_unused
//! ```
//!
//! Released slots form an intrusive LIFO list; slots past `next_unused` have
//! never been touched, which keeps [`Pool::new`] a `const fn` for statics.

use core::ops::{Index, IndexMut};

/// Stable index of a record inside a [`Pool`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Handle(u32);

impl Handle {
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// The pool has no vacant slot left.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("object pool exhausted")]
pub struct PoolExhausted;

enum Slot<T> {
    Vacant { next: Option<Handle> },
    Occupied(T),
}

/// A fixed-size typed allocator with `N` slots.
///
/// [`acquire`](Self::acquire) runs `T::default()` on the slot, so every record
/// starts with all of its linkage unlinked.
pub struct Pool<T, const N: usize> {
    slots: [Slot<T>; N],
    /// Head of the list of released slots.
    free_head: Option<Handle>,
    /// First slot that has never been handed out.
    next_unused: usize,
    in_use: usize,
}

impl<T, const N: usize> Pool<T, N> {
    const CAPACITY_FITS_HANDLE: () = assert!(N <= u32::MAX as usize, "pool too large");

    #[must_use]
    pub const fn new() -> Self {
        let () = Self::CAPACITY_FITS_HANDLE;
        Self {
            slots: [const { Slot::Vacant { next: None } }; N],
            free_head: None,
            next_unused: 0,
            in_use: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[inline]
    #[must_use]
    pub const fn in_use(&self) -> usize {
        self.in_use
    }

    #[inline]
    #[must_use]
    pub const fn available(&self) -> usize {
        N - self.in_use
    }

    /// Take a slot and initialize it with `T::default()`.
    ///
    /// # Errors
    /// [`PoolExhausted`] if all `N` slots are occupied.
    pub fn acquire(&mut self) -> Result<Handle, PoolExhausted>
    where
        T: Default,
    {
        let handle = if let Some(handle) = self.free_head {
            let Slot::Vacant { next } = self.slots[handle.index()] else {
                unreachable!("free list points at occupied slot {}", handle.index());
            };
            self.free_head = next;
            handle
        } else if self.next_unused < N {
            #[allow(clippy::cast_possible_truncation)]
            let handle = Handle(self.next_unused as u32);
            self.next_unused += 1;
            handle
        } else {
            return Err(PoolExhausted);
        };

        self.slots[handle.index()] = Slot::Occupied(T::default());
        self.in_use += 1;
        Ok(handle)
    }

    /// Return a slot to the pool, handing back the record it held.
    ///
    /// # Panics
    /// If `handle` does not refer to an occupied slot.
    pub fn release(&mut self, handle: Handle) -> T {
        assert!(
            matches!(self.slots[handle.index()], Slot::Occupied(_)),
            "release of vacant pool slot {}",
            handle.index()
        );
        let slot = core::mem::replace(
            &mut self.slots[handle.index()],
            Slot::Vacant {
                next: self.free_head,
            },
        );
        let Slot::Occupied(value) = slot else {
            unreachable!();
        };
        self.free_head = Some(handle);
        self.in_use -= 1;
        value
    }

    /// Shared access to an occupied slot, `None` if vacant or out of range.
    #[must_use]
    pub fn get(&self, handle: Handle) -> Option<&T> {
        match self.slots.get(handle.index()) {
            Some(Slot::Occupied(value)) => Some(value),
            _ => None,
        }
    }
}

impl<T, const N: usize> Default for Pool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Index<Handle> for Pool<T, N> {
    type Output = T;

    fn index(&self, handle: Handle) -> &T {
        match &self.slots[handle.index()] {
            Slot::Occupied(value) => value,
            Slot::Vacant { .. } => panic!("stale pool handle {}", handle.index()),
        }
    }
}

impl<T, const N: usize> IndexMut<Handle> for Pool<T, N> {
    fn index_mut(&mut self, handle: Handle) -> &mut T {
        match &mut self.slots[handle.index()] {
            Slot::Occupied(value) => value,
            Slot::Vacant { .. } => panic!("stale pool handle {}", handle.index()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Debug, PartialEq)]
    struct Record {
        value: u64,
    }

    #[test]
    fn acquire_until_exhausted() {
        let mut pool = Pool::<Record, 3>::new();
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let c = pool.acquire().unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.acquire(), Err(PoolExhausted));
    }

    #[test]
    fn released_slots_are_reused_and_reset() {
        let mut pool = Pool::<Record, 2>::new();
        let a = pool.acquire().unwrap();
        pool[a].value = 42;
        let _b = pool.acquire().unwrap();

        assert_eq!(pool.release(a), Record { value: 42 });
        assert_eq!(pool.in_use(), 1);
        assert!(pool.get(a).is_none());

        let again = pool.acquire().unwrap();
        assert_eq!(again, a);
        assert_eq!(pool[again].value, 0, "acquire must hand out a fresh record");
    }

    #[test]
    #[should_panic(expected = "release of vacant pool slot")]
    fn double_release_panics() {
        let mut pool = Pool::<Record, 1>::new();
        let a = pool.acquire().unwrap();
        pool.release(a);
        pool.release(a);
    }

    #[test]
    fn zero_capacity_pool_is_always_exhausted() {
        let mut pool = Pool::<Record, 0>::new();
        assert_eq!(pool.capacity(), 0);
        assert_eq!(pool.acquire(), Err(PoolExhausted));
    }
}
