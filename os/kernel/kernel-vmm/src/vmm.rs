//! Virtual address range allocator.
//!
//! A [`Vmm`] manages one window of virtual address space. It tracks every
//! interval of the window, free or allocated, as a [`Block`] and keeps the
//! blocks in three structures at once:
//!
//! - the address index ([`AddrTree`]), to find the block owning an address,
//! - the size index ([`SizeTree`]), holding only free blocks, for best-fit,
//! - the adjacency list ([`BlockList`]), for coalescing on free.
//!
//! # Invariants
//! - The blocks tile `[base, base + size)` of the window without gaps or overlaps.
//! - A block is in the size index iff it is free.
//! - No two address-adjacent blocks are both free.
//!
//! # Example
//! ```ignore
//! use kernel_vmm::{VirtualAddress, vmm::Vmm};
//! let mut vmm = Vmm::<64>::new();
//! vmm.init(VirtualAddress::new(0xFFFF_C000_0000_0000), 1 << 30)?;
//! let va = vmm.alloc(0x4000)?;
//! vmm.free(va)?;
//! ```

use log::{debug, trace, warn};

use crate::addr_tree::AddrTree;
use crate::addresses::VirtualAddress;
use crate::block::Block;
use crate::block_list::BlockList;
use crate::pool::{Handle, Pool, PoolExhausted};
use crate::size_tree::SizeTree;

/// A snapshot of one tracked interval.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Interval {
    pub base: VirtualAddress,
    pub size: u64,
    pub allocated: bool,
}

impl Interval {
    /// Exclusive end of the interval.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base.as_u64() + self.size
    }

    const fn of(block: &Block) -> Self {
        Self {
            base: VirtualAddress::new(block.base),
            size: block.size,
            allocated: block.allocated,
        }
    }
}

/// Range allocator over one virtual window, with room for `N` intervals.
pub struct Vmm<const N: usize> {
    blocks: Pool<Block, N>,
    addr: AddrTree,
    sizes: SizeTree,
    list: BlockList,
    /// `(base, size)` of the managed window; `None` until [`init`](Self::init).
    range: Option<(u64, u64)>,
    free_size: u64,
}

impl<const N: usize> Vmm<N> {
    /// An uninitialized allocator. Call [`init`](Self::init) before use.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            blocks: Pool::new(),
            addr: AddrTree::new(),
            sizes: SizeTree::new(),
            list: BlockList::new(),
            range: None,
            free_size: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.range.is_some()
    }

    /// Take ownership of `[base, base + size)` as a single free interval.
    ///
    /// # Errors
    /// - [`VmmInitError::AlreadyInitialized`] on a second call.
    /// - [`VmmInitError::EmptyRange`] if `size` is zero.
    /// - [`VmmInitError::RangeOverflow`] if the exclusive end `base + size` is
    ///   not representable, which includes a window ending exactly at 2^64.
    /// - [`VmmInitError::BootstrapExhausted`] if the pool cannot supply the
    ///   first interval; no range can exist without it.
    pub fn init(&mut self, base: VirtualAddress, size: u64) -> Result<(), VmmInitError> {
        if self.range.is_some() {
            return Err(VmmInitError::AlreadyInitialized);
        }
        if size == 0 {
            return Err(VmmInitError::EmptyRange);
        }
        if base.checked_add(size).is_none() {
            return Err(VmmInitError::RangeOverflow);
        }

        let first = self
            .blocks
            .acquire()
            .map_err(|_| VmmInitError::BootstrapExhausted)?;
        {
            let block = &mut self.blocks[first];
            block.base = base.as_u64();
            block.size = size;
            block.allocated = false;
        }
        self.list.push_back(&mut self.blocks, first);
        self.index_address(first);
        self.sizes.insert(&mut self.blocks, first);

        self.range = Some((base.as_u64(), size));
        self.free_size = size;
        debug!("vmm: managing {base}..0x{:016X} ({size:#x} bytes)", base.as_u64() + size);
        Ok(())
    }

    /// Allocate `size` bytes of address space from the smallest free interval
    /// that can hold them.
    ///
    /// # Errors
    /// See [`alloc_aligned`](Self::alloc_aligned).
    pub fn alloc(&mut self, size: u64) -> Result<VirtualAddress, VmmError> {
        self.alloc_aligned(size, 1)
    }

    /// Allocate `size` bytes starting at a multiple of `align`.
    ///
    /// Free intervals are tried smallest size first; the first one that can
    /// hold an `align`-aligned range of `size` bytes is split.
    ///
    /// # Errors
    /// - [`VmmError::NotInitialized`] before [`init`](Self::init).
    /// - [`VmmError::ZeroSize`] if `size` is zero.
    /// - [`VmmError::InvalidAlignment`] if `align` is not a power of two.
    /// - [`VmmError::OutOfSpace`] if no free interval fits.
    /// - [`VmmError::PoolExhausted`] if every fitting interval needs more
    ///   records to split than the pool has left. Nothing is modified in that
    ///   case.
    pub fn alloc_aligned(&mut self, size: u64, align: u64) -> Result<VirtualAddress, VmmError> {
        if self.range.is_none() {
            return Err(VmmError::NotInitialized);
        }
        if size == 0 {
            return Err(VmmError::ZeroSize);
        }
        if !align.is_power_of_two() {
            return Err(VmmError::InvalidAlignment(align));
        }

        // Aligned fits may leave remainders on both sides; skip those the
        // pool cannot split right now in favor of a larger candidate.
        let available = self.blocks.available();
        let mut starved = false;
        let found = if align == 1 {
            self.sizes
                .find_at_least(&self.blocks, size)
                .map(|h| (h, self.blocks[h].base))
        } else {
            self.sizes.candidates(&self.blocks, size).find_map(|h| {
                let block = &self.blocks[h];
                let at = Self::aligned_fit(block, size, align)?;
                if Self::records_needed(block, at, size) > available {
                    starved = true;
                    return None;
                }
                Some((h, at))
            })
        };

        let Some((h, at)) = found else {
            if starved {
                warn!("vmm: interval pool exhausted allocating {size:#x} bytes");
                return Err(VmmError::PoolExhausted);
            }
            warn!("vmm: no free range for {size:#x} bytes (align {align:#x})");
            return Err(VmmError::OutOfSpace(size));
        };

        let carved = self.split(h, at, size).inspect_err(|_| {
            warn!("vmm: interval pool exhausted allocating {size:#x} bytes");
        })?;
        Ok(VirtualAddress::new(self.blocks[carved].base))
    }

    /// Allocate exactly `[base, base + size)`.
    ///
    /// # Errors
    /// - [`VmmError::NotInitialized`] before [`init`](Self::init).
    /// - [`VmmError::ZeroSize`] if `size` is zero.
    /// - [`VmmError::InvalidRange`] if the range is not inside the window.
    /// - [`VmmError::RangeUnavailable`] if any part of it is already allocated.
    /// - [`VmmError::PoolExhausted`] as for [`alloc_aligned`](Self::alloc_aligned).
    pub fn reserve(&mut self, base: VirtualAddress, size: u64) -> Result<VirtualAddress, VmmError> {
        let Some((window_base, window_size)) = self.range else {
            return Err(VmmError::NotInitialized);
        };
        if size == 0 {
            return Err(VmmError::ZeroSize);
        }
        let end = base
            .checked_add(size)
            .ok_or(VmmError::InvalidRange)?
            .as_u64();
        if base.as_u64() < window_base || end > window_base + window_size {
            return Err(VmmError::InvalidRange);
        }

        let h = self
            .addr
            .find_containing(&self.blocks, base.as_u64())
            .ok_or(VmmError::InvalidRange)?;
        let block = &self.blocks[h];
        if block.allocated || end > block.end() {
            return Err(VmmError::RangeUnavailable);
        }

        let carved = self.split(h, base.as_u64(), size)?;
        Ok(VirtualAddress::new(self.blocks[carved].base))
    }

    /// Release the allocation starting at `address`, coalescing it with any
    /// free neighbors.
    ///
    /// # Errors
    /// - [`VmmError::NotInitialized`] before [`init`](Self::init).
    /// - [`VmmError::InvalidAddress`] if `address` is not the base of an
    ///   allocated interval (interior addresses and double frees included).
    pub fn free(&mut self, address: VirtualAddress) -> Result<(), VmmError> {
        if self.range.is_none() {
            return Err(VmmError::NotInitialized);
        }

        let Some(h) = self
            .addr
            .find(&self.blocks, address.as_u64())
            .filter(|&h| self.blocks[h].allocated)
        else {
            warn!("vmm: rejecting free of {address}");
            return Err(VmmError::InvalidAddress(address));
        };

        let block = &mut self.blocks[h];
        block.allocated = false;
        self.free_size += block.size;
        self.merge(h);
        Ok(())
    }

    /// The interval containing `address`, if it lies inside the window.
    #[must_use]
    pub fn find(&self, address: VirtualAddress) -> Option<Interval> {
        self.addr
            .find_containing(&self.blocks, address.as_u64())
            .map(|h| Interval::of(&self.blocks[h]))
    }

    /// All intervals in address order.
    #[must_use]
    pub fn intervals(&self) -> Intervals<'_, N> {
        Intervals {
            vmm: self,
            cursor: self.list.head(),
        }
    }

    /// `(base, size)` of the managed window.
    #[must_use]
    pub const fn range(&self) -> Option<(VirtualAddress, u64)> {
        match self.range {
            Some((base, size)) => Some((VirtualAddress::new(base), size)),
            None => None,
        }
    }

    #[must_use]
    pub const fn free_size(&self) -> u64 {
        self.free_size
    }

    #[must_use]
    pub const fn allocated_size(&self) -> u64 {
        match self.range {
            Some((_, size)) => size - self.free_size,
            None => 0,
        }
    }

    /// Size of the largest free interval.
    #[must_use]
    pub fn largest_free(&self) -> Option<u64> {
        self.sizes.largest(&self.blocks)
    }

    #[must_use]
    pub const fn interval_count(&self) -> usize {
        self.list.len()
    }

    #[must_use]
    pub const fn free_interval_count(&self) -> usize {
        self.sizes.len()
    }

    /// Number of distinct free interval sizes.
    #[must_use]
    pub const fn size_classes(&self) -> usize {
        self.sizes.classes()
    }

    /// Interval records still available for splits.
    #[must_use]
    pub const fn pool_available(&self) -> usize {
        self.blocks.available()
    }

    /// Start of an `align`-aligned range of `size` bytes inside `block`, if any.
    fn aligned_fit(block: &Block, size: u64, align: u64) -> Option<u64> {
        let at = VirtualAddress::new(block.base).align_up(align)?.as_u64();
        let end = at.checked_add(size)?;
        (end <= block.end()).then_some(at)
    }

    /// New records a split of `block` at `[at, at + size)` takes: one per
    /// non-empty remainder.
    fn records_needed(block: &Block, at: u64, size: u64) -> usize {
        usize::from(at > block.base) + usize::from(at + size < block.end())
    }

    /// Carve `[at, at + size)` out of the free block `h` and mark it allocated.
    ///
    /// Up to two new blocks are created for the leading and trailing
    /// remainders. Pool capacity for both is checked before anything is
    /// touched, so a failed split leaves every structure as it was.
    fn split(&mut self, h: Handle, at: u64, size: u64) -> Result<Handle, VmmError> {
        let (base, end) = {
            let block = &self.blocks[h];
            debug_assert!(!block.allocated);
            (block.base, block.end())
        };
        debug_assert!(at >= base && at + size <= end);

        let lead = at - base;
        let trail = end - (at + size);
        if self.blocks.available() < Self::records_needed(&self.blocks[h], at, size) {
            return Err(VmmError::PoolExhausted);
        }

        trace!("vmm: split [{base:#x}, {end:#x}) at {at:#x}+{size:#x}");
        self.sizes.remove(&mut self.blocks, h);

        let carved = if lead > 0 {
            self.blocks[h].size = lead;
            self.sizes.insert(&mut self.blocks, h);
            self.new_block_after(h, at, size)?
        } else {
            self.blocks[h].size = size;
            h
        };

        if trail > 0 {
            let tail = self.new_block_after(carved, at + size, trail)?;
            self.sizes.insert(&mut self.blocks, tail);
        }

        self.blocks[carved].allocated = true;
        self.free_size -= size;
        debug_assert_eq!(self.addr.len(), self.list.len());
        Ok(carved)
    }

    /// Create a free block for `[base, base + size)` directly after `prev` in
    /// address order. The caller adds it to the size index if it stays free.
    fn new_block_after(&mut self, prev: Handle, base: u64, size: u64) -> Result<Handle, PoolExhausted> {
        let h = self.blocks.acquire()?;
        {
            let block = &mut self.blocks[h];
            block.base = base;
            block.size = size;
        }
        self.index_address(h);
        self.list.insert_after(&mut self.blocks, prev, h);
        Ok(h)
    }

    /// Absorb the free neighbors of the (now free) block `h` and put the
    /// result back into the size index.
    fn merge(&mut self, h: Handle) {
        while let Some(prev) =
            BlockList::prev(&self.blocks, h).filter(|&p| !self.blocks[p].allocated)
        {
            let absorbed = self.unlink_free(prev);
            debug_assert_eq!(absorbed.end(), self.blocks[h].base);
            trace!(
                "vmm: merge [{:#x}, {:#x}) into {:#x}",
                absorbed.base,
                absorbed.end(),
                self.blocks[h].base
            );

            // The base moves down, so the address key changes.
            self.addr.remove(&mut self.blocks, h);
            let block = &mut self.blocks[h];
            block.base = absorbed.base;
            block.size += absorbed.size;
            self.index_address(h);
        }

        while let Some(next) =
            BlockList::next(&self.blocks, h).filter(|&n| !self.blocks[n].allocated)
        {
            let absorbed = self.unlink_free(next);
            debug_assert_eq!(self.blocks[h].end(), absorbed.base);
            trace!(
                "vmm: merge [{:#x}, {:#x}) into {:#x}",
                absorbed.base,
                absorbed.end(),
                self.blocks[h].base
            );
            self.blocks[h].size += absorbed.size;
        }

        self.sizes.insert(&mut self.blocks, h);
        debug_assert_eq!(self.addr.len(), self.list.len());
    }

    /// Remove a free block from all three structures and return its record
    /// to the pool.
    fn unlink_free(&mut self, h: Handle) -> Block {
        self.sizes.remove(&mut self.blocks, h);
        self.addr.remove(&mut self.blocks, h);
        self.list.remove(&mut self.blocks, h);
        self.blocks.release(h)
    }

    /// Add `h` to the address index.
    ///
    /// # Panics
    /// If another block already starts at the same address. The blocks tile
    /// the window, so this means the allocator's state is corrupt.
    fn index_address(&mut self, h: Handle) {
        if let Err(e) = self.addr.insert(&mut self.blocks, h) {
            panic!("vmm: address index corrupt: {e}");
        }
    }
}

impl<const N: usize> Default for Vmm<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator returned by [`Vmm::intervals`].
pub struct Intervals<'a, const N: usize> {
    vmm: &'a Vmm<N>,
    cursor: Option<Handle>,
}

impl<const N: usize> Iterator for Intervals<'_, N> {
    type Item = Interval;

    fn next(&mut self) -> Option<Interval> {
        let h = self.cursor?;
        self.cursor = BlockList::next(&self.vmm.blocks, h);
        Some(Interval::of(&self.vmm.blocks[h]))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmmError {
    #[error("range allocator not initialized")]
    NotInitialized,
    #[error("zero-sized allocation")]
    ZeroSize,
    #[error("alignment {0:#x} is not a power of two")]
    InvalidAlignment(u64),
    #[error("range outside the managed window")]
    InvalidRange,
    #[error("no free range of {0:#x} bytes")]
    OutOfSpace(u64),
    #[error("{0} is not the base of an allocated range")]
    InvalidAddress(VirtualAddress),
    #[error("requested range is not free")]
    RangeUnavailable,
    #[error("interval pool exhausted")]
    PoolExhausted,
}

impl From<PoolExhausted> for VmmError {
    fn from(_: PoolExhausted) -> Self {
        Self::PoolExhausted
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmmInitError {
    #[error("range allocator already initialized")]
    AlreadyInitialized,
    #[error("empty range")]
    EmptyRange,
    /// Interval ends are exclusive `u64`s, so the last byte of the address
    /// space can never be managed.
    #[error("range end not representable")]
    RangeOverflow,
    #[error("failed to allocate initial interval")]
    BootstrapExhausted,
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: u64 = 0xFFFF_C000_0000_0000;

    impl<const N: usize> Vmm<N> {
        /// Assert every structural invariant of the allocator.
        fn check(&self) {
            let Some((base, size)) = self.range else {
                assert_eq!(self.list.len(), 0);
                assert_eq!(self.blocks.in_use(), 0);
                return;
            };

            let mut expected = base;
            let mut free_blocks = 0;
            let mut free_bytes = 0;
            let mut prev_free = false;
            let mut cursor = self.list.head();
            let mut last = None;
            while let Some(h) = cursor {
                let block = &self.blocks[h];
                assert_eq!(block.base, expected, "gap or overlap at {expected:#x}");
                assert!(block.size > 0, "empty block");
                assert_eq!(BlockList::prev(&self.blocks, h), last, "broken back link");
                assert_eq!(self.addr.find(&self.blocks, block.base), Some(h));
                if !block.allocated {
                    assert!(!prev_free, "adjacent free blocks at {:#x}", block.base);
                    free_blocks += 1;
                    free_bytes += block.size;
                }
                prev_free = !block.allocated;
                expected = block.end();
                last = Some(h);
                cursor = BlockList::next(&self.blocks, h);
            }
            assert_eq!(expected, base + size, "window not fully covered");

            self.addr.validate(&self.blocks);
            assert_eq!(self.sizes.validate(&self.blocks), free_blocks);
            assert_eq!(self.addr.len(), self.list.len());
            assert_eq!(self.blocks.in_use(), self.list.len());
            assert_eq!(self.free_size, free_bytes);
        }
    }

    fn ready<const N: usize>(size: u64) -> Vmm<N> {
        let mut vmm = Vmm::<N>::new();
        vmm.init(VirtualAddress::new(BASE), size).unwrap();
        vmm.check();
        vmm
    }

    #[test]
    fn operations_require_init() {
        let mut vmm = Vmm::<4>::new();
        assert_eq!(vmm.alloc(1), Err(VmmError::NotInitialized));
        assert_eq!(vmm.free(VirtualAddress::new(BASE)), Err(VmmError::NotInitialized));
        assert_eq!(
            vmm.reserve(VirtualAddress::new(BASE), 1),
            Err(VmmError::NotInitialized)
        );
        assert!(vmm.find(VirtualAddress::new(BASE)).is_none());
        vmm.check();
    }

    #[test]
    fn init_rejects_bad_ranges() {
        let mut vmm = Vmm::<4>::new();
        assert_eq!(
            vmm.init(VirtualAddress::new(BASE), 0),
            Err(VmmInitError::EmptyRange)
        );
        assert_eq!(
            vmm.init(VirtualAddress::new(u64::MAX), 2),
            Err(VmmInitError::RangeOverflow)
        );
        vmm.init(VirtualAddress::new(BASE), 0x1000).unwrap();
        assert_eq!(
            vmm.init(VirtualAddress::new(BASE), 0x1000),
            Err(VmmInitError::AlreadyInitialized)
        );
    }

    #[test]
    fn init_without_pool_capacity_fails() {
        let mut vmm = Vmm::<0>::new();
        assert_eq!(
            vmm.init(VirtualAddress::new(BASE), 0x1000),
            Err(VmmInitError::BootstrapExhausted)
        );
        assert!(!vmm.is_initialized());
    }

    #[test]
    fn exact_fit_flips_flag_in_place() {
        let mut vmm = ready::<8>(0x3000);
        let a = vmm.alloc(0x1000).unwrap();
        let b = vmm.alloc(0x1000).unwrap();
        let c = vmm.alloc(0x1000).unwrap();
        assert_eq!(a.as_u64(), BASE);
        assert_eq!(b.as_u64(), BASE + 0x1000);
        assert_eq!(c.as_u64(), BASE + 0x2000);
        vmm.check();

        vmm.free(b).unwrap();
        vmm.check();
        let in_use = vmm.blocks.in_use();
        // The hole matches exactly: no new record is needed.
        assert_eq!(vmm.alloc(0x1000), Ok(b));
        assert_eq!(vmm.blocks.in_use(), in_use);
        vmm.check();
    }

    #[test]
    fn aligned_alloc_leaves_leading_remainder() {
        let mut vmm = ready::<8>(0x10_0000);
        let small = vmm.alloc(0x10).unwrap();
        assert_eq!(small.as_u64(), BASE);

        let page = vmm.alloc_aligned(0x1000, 0x1000).unwrap();
        assert_eq!(page.as_u64(), BASE + 0x1000);
        vmm.check();

        let lead = vmm.find(VirtualAddress::new(BASE + 0x10)).unwrap();
        assert_eq!(lead.base.as_u64(), BASE + 0x10);
        assert_eq!(lead.size, 0x1000 - 0x10);
        assert!(!lead.allocated);

        vmm.free(page).unwrap();
        vmm.free(small).unwrap();
        vmm.check();
        assert_eq!(vmm.interval_count(), 1);
    }

    #[test]
    fn aligned_alloc_skips_unalignable_candidates() {
        let mut vmm = ready::<16>(0x8000);
        let _a = vmm.alloc(0x80).unwrap();
        let hole = vmm.alloc(0x100).unwrap();
        let _c = vmm.alloc(0x80).unwrap();
        vmm.free(hole).unwrap();
        vmm.check();
        assert_eq!(hole.as_u64(), BASE + 0x80);

        // The 0x100 hole is the best fit by size but has no 0x100-aligned start
        // that leaves room for 0x100 bytes.
        let aligned = vmm.alloc_aligned(0x100, 0x100).unwrap();
        assert_eq!(aligned.as_u64(), BASE + 0x200);
        vmm.check();

        // Without the alignment constraint the hole is used.
        assert_eq!(vmm.alloc(0x100), Ok(hole));
        vmm.check();
    }

    #[test]
    fn rejected_alignment_and_size() {
        let mut vmm = ready::<4>(0x1000);
        assert_eq!(vmm.alloc(0), Err(VmmError::ZeroSize));
        assert_eq!(vmm.alloc_aligned(0x10, 3), Err(VmmError::InvalidAlignment(3)));
        assert_eq!(vmm.alloc_aligned(0x10, 0), Err(VmmError::InvalidAlignment(0)));
        vmm.check();
    }

    #[test]
    fn failed_split_leaves_state_untouched() {
        // Two records: the initial block plus one for the first remainder.
        let mut vmm = ready::<2>(0x10_000);
        let a = vmm.alloc(0x1000).unwrap();
        vmm.check();
        assert_eq!(vmm.pool_available(), 0);

        let before: Vec<_> = vmm.intervals().collect();
        assert_eq!(vmm.alloc(0x1000), Err(VmmError::PoolExhausted));
        assert_eq!(
            vmm.reserve(VirtualAddress::new(BASE + 0x4000), 0x1000),
            Err(VmmError::PoolExhausted)
        );
        assert_eq!(vmm.intervals().collect::<Vec<_>>(), before);
        vmm.check();

        // An exact fit needs no record and still succeeds.
        assert_eq!(vmm.alloc(0xF000).map(VirtualAddress::as_u64), Ok(BASE + 0x1000));
        vmm.free(a).unwrap();
        vmm.check();
    }

    #[test]
    fn aligned_alloc_prefers_candidate_the_pool_can_split() {
        let mut vmm = ready::<5>(0x10_000);
        let _a = vmm.alloc(0x100).unwrap();
        let b = vmm.alloc(0x1000).unwrap();
        let _c = vmm.alloc(0x700).unwrap();
        vmm.free(b).unwrap();
        vmm.check();
        assert_eq!(vmm.pool_available(), 1);

        // The smaller hole [0x100, 0x1100) would leave remainders on both
        // sides; the tail starts aligned and needs one record only.
        let page = vmm.alloc_aligned(0x100, 0x800).unwrap();
        assert_eq!(page.as_u64(), BASE + 0x1800);
        vmm.check();

        // Every remaining candidate needs two records now.
        let before: Vec<_> = vmm.intervals().collect();
        assert_eq!(vmm.alloc_aligned(0x100, 0x800), Err(VmmError::PoolExhausted));
        assert_eq!(vmm.intervals().collect::<Vec<_>>(), before);
        vmm.check();
    }

    #[test]
    fn reserve_fixed_ranges() {
        let mut vmm = ready::<8>(0x10_000);
        let r = vmm.reserve(VirtualAddress::new(BASE + 0x4000), 0x2000).unwrap();
        assert_eq!(r.as_u64(), BASE + 0x4000);
        vmm.check();
        assert_eq!(vmm.interval_count(), 3);

        assert_eq!(
            vmm.reserve(VirtualAddress::new(BASE + 0x5000), 0x10),
            Err(VmmError::RangeUnavailable)
        );
        assert_eq!(
            vmm.reserve(VirtualAddress::new(BASE + 0x3000), 0x2000),
            Err(VmmError::RangeUnavailable)
        );
        assert_eq!(
            vmm.reserve(VirtualAddress::new(BASE + 0xF000), 0x2000),
            Err(VmmError::InvalidRange)
        );
        assert_eq!(
            vmm.reserve(VirtualAddress::new(BASE - 1), 0x10),
            Err(VmmError::InvalidRange)
        );

        // Best fit now picks the smaller leading hole.
        let a = vmm.alloc(0x1000).unwrap();
        assert_eq!(a.as_u64(), BASE);
        vmm.free(r).unwrap();
        vmm.free(a).unwrap();
        vmm.check();
        assert_eq!(vmm.interval_count(), 1);
    }

    #[test]
    fn free_merges_both_neighbors() {
        let mut vmm = ready::<8>(0x4000);
        let a = vmm.alloc(0x1000).unwrap();
        let b = vmm.alloc(0x1000).unwrap();
        let c = vmm.alloc(0x1000).unwrap();
        vmm.free(a).unwrap();
        vmm.free(c).unwrap();
        vmm.check();
        assert_eq!(vmm.interval_count(), 3);

        vmm.free(b).unwrap();
        vmm.check();
        assert_eq!(vmm.interval_count(), 1);
        assert_eq!(vmm.pool_available(), 7);
        assert_eq!(vmm.largest_free(), Some(0x4000));
    }

    #[test]
    fn randomized_sequences_keep_invariants() {
        let mut vmm = ready::<128>(0x100_0000);
        let mut live: Vec<(VirtualAddress, u64)> = Vec::new();
        let mut state = 0x2545_F491_4F6C_DD1D_u64;
        let mut rand = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        for _ in 0..3000 {
            let r = rand();
            if live.is_empty() || r % 5 < 3 {
                let size = (rand() % 0x4000) + 1;
                let align = 1 << (rand() % 13);
                let result = if r % 7 == 0 {
                    vmm.alloc_aligned(size, align)
                } else {
                    vmm.alloc(size)
                };
                match result {
                    Ok(va) => {
                        assert!(va.is_aligned(if r % 7 == 0 { align } else { 1 }));
                        for &(other, other_size) in &live {
                            let disjoint = va.as_u64() + size <= other.as_u64()
                                || other.as_u64() + other_size <= va.as_u64();
                            assert!(disjoint, "overlapping allocations");
                        }
                        live.push((va, size));
                    }
                    Err(VmmError::OutOfSpace(_) | VmmError::PoolExhausted) => {}
                    Err(e) => panic!("unexpected error {e}"),
                }
            } else {
                #[allow(clippy::cast_possible_truncation)]
                let (va, _) = live.swap_remove((r as usize) % live.len());
                vmm.free(va).unwrap();
                assert_eq!(vmm.free(va), Err(VmmError::InvalidAddress(va)));
            }
            vmm.check();
        }

        for (va, _) in live.drain(..) {
            vmm.free(va).unwrap();
        }
        vmm.check();
        assert_eq!(vmm.interval_count(), 1);
        assert_eq!(vmm.free_size(), 0x100_0000);
    }
}
