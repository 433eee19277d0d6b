//! # Serialized Range Allocator
//!
//! Split and merge rewrite both indices and the adjacency list in several
//! steps, so a range must never be touched by two callers at once. A
//! [`LockedVmm`] owns one [`Vmm`] behind a [`SpinLock`] and holds the lock
//! for the whole duration of every operation.
//!
//! Independent ranges (one per address space) each get their own
//! [`LockedVmm`] and never contend with each other.

use kernel_sync::SpinLock;

use crate::addresses::VirtualAddress;
use crate::vmm::{Interval, Vmm, VmmError, VmmInitError};

pub struct LockedVmm<const N: usize> {
    inner: SpinLock<Vmm<N>>,
}

impl<const N: usize> LockedVmm<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: SpinLock::new(Vmm::new()),
        }
    }

    /// See [`Vmm::init`].
    ///
    /// # Errors
    /// As [`Vmm::init`].
    pub fn init(&self, base: VirtualAddress, size: u64) -> Result<(), VmmInitError> {
        self.inner.with_lock(|vmm| vmm.init(base, size))
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.with_lock(|vmm| vmm.is_initialized())
    }

    /// See [`Vmm::alloc`].
    ///
    /// # Errors
    /// As [`Vmm::alloc`].
    pub fn alloc(&self, size: u64) -> Result<VirtualAddress, VmmError> {
        self.inner.with_lock(|vmm| vmm.alloc(size))
    }

    /// See [`Vmm::alloc_aligned`].
    ///
    /// # Errors
    /// As [`Vmm::alloc_aligned`].
    pub fn alloc_aligned(&self, size: u64, align: u64) -> Result<VirtualAddress, VmmError> {
        self.inner.with_lock(|vmm| vmm.alloc_aligned(size, align))
    }

    /// See [`Vmm::reserve`].
    ///
    /// # Errors
    /// As [`Vmm::reserve`].
    pub fn reserve(&self, base: VirtualAddress, size: u64) -> Result<VirtualAddress, VmmError> {
        self.inner.with_lock(|vmm| vmm.reserve(base, size))
    }

    /// See [`Vmm::free`].
    ///
    /// # Errors
    /// As [`Vmm::free`].
    pub fn free(&self, address: VirtualAddress) -> Result<(), VmmError> {
        self.inner.with_lock(|vmm| vmm.free(address))
    }

    #[must_use]
    pub fn find(&self, address: VirtualAddress) -> Option<Interval> {
        self.inner.with_lock(|vmm| vmm.find(address))
    }

    /// Run `f` with the allocator locked, e.g. to inspect several values
    /// consistently.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut Vmm<N>) -> R) -> R {
        self.inner.with_lock(f)
    }

    /// Direct access when no other reference can exist.
    pub fn get_mut(&mut self) -> &mut Vmm<N> {
        self.inner.get_mut()
    }
}

impl<const N: usize> Default for LockedVmm<N> {
    fn default() -> Self {
        Self::new()
    }
}
