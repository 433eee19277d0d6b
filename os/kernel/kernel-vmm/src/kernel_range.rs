//! # Kernel Virtual Window
//!
//! The kernel's own range allocator, covering the reserved window from
//! [`kernel_info::memory`]. Other address spaces build their own
//! [`Vmm`](crate::vmm::Vmm) or [`LockedVmm`] instead of sharing this one.

use core::sync::atomic::{AtomicBool, Ordering};

use kernel_info::memory::{VMM_BLOCK_POOL_CAPACITY, VMM_RESERVED_BASE, VMM_RESERVED_SIZE};

use crate::addresses::VirtualAddress;
use crate::locked::LockedVmm;
use crate::vmm::{VmmError, VmmInitError};

/// Allocator for `[VMM_RESERVED_BASE, VMM_RESERVED_BASE + VMM_RESERVED_SIZE)`.
pub static KERNEL_VMM: LockedVmm<VMM_BLOCK_POOL_CAPACITY> = LockedVmm::new();

/// One-time initialization flag.
static DID_INIT: AtomicBool = AtomicBool::new(false);

/// Ensure the kernel window is initialized (idempotent).
///
/// # Panics
/// If the first interval cannot be set up. The kernel cannot hand out any
/// virtual memory without it, so boot cannot continue.
pub fn ensure_init() {
    if DID_INIT.load(Ordering::Acquire) {
        return;
    }
    KERNEL_VMM.with_lock(|vmm| {
        if vmm.is_initialized() {
            return;
        }
        match vmm.init(VirtualAddress::new(VMM_RESERVED_BASE), VMM_RESERVED_SIZE) {
            Ok(()) | Err(VmmInitError::AlreadyInitialized) => {}
            Err(e) => panic!("failed to allocate initial vmm block: {e}"),
        }
        DID_INIT.store(true, Ordering::Release);
    });
}

/// Allocate `size` bytes of kernel virtual address space.
///
/// # Errors
/// As [`Vmm::alloc`](crate::vmm::Vmm::alloc).
pub fn alloc(size: u64) -> Result<VirtualAddress, VmmError> {
    ensure_init();
    KERNEL_VMM.alloc(size)
}

/// Allocate `size` bytes of kernel virtual address space aligned to `align`.
///
/// # Errors
/// As [`Vmm::alloc_aligned`](crate::vmm::Vmm::alloc_aligned).
pub fn alloc_aligned(size: u64, align: u64) -> Result<VirtualAddress, VmmError> {
    ensure_init();
    KERNEL_VMM.alloc_aligned(size, align)
}

/// Return a range obtained from [`alloc`] or [`alloc_aligned`].
///
/// # Errors
/// As [`Vmm::free`](crate::vmm::Vmm::free).
pub fn free(address: VirtualAddress) -> Result<(), VmmError> {
    ensure_init();
    KERNEL_VMM.free(address)
}
