//! # Memory Layout

/// End of userspace VA range after which Kernel space begins.
pub const USERSPACE_END: u64 = 0xffff_0000_0000_0000;

/// Higher Half Direct Map (HHDM) base: physical memory is visible at
/// [`HHDM_BASE`] + `pa`.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Where the kernel image executes (VMA).
pub const KERNEL_BASE: u64 = 0xffff_ffff_8000_0000;

/// Start of the kernel's dynamically allocated virtual window.
///
/// Ranges in this window are handed out by the kernel VMM; nothing else may
/// map here.
pub const VMM_RESERVED_BASE: u64 = 0xffff_c000_0000_0000;

/// Size of the kernel's dynamically allocated virtual window (64 GiB).
pub const VMM_RESERVED_SIZE: u64 = 64 * 1024 * 1024 * 1024;

/// Number of interval records available to the kernel VMM.
///
/// Each live interval (free or allocated) takes one record; an allocation
/// needs at most two more.
pub const VMM_BLOCK_POOL_CAPACITY: usize = 1024;

const _: () = {
    assert!(HHDM_BASE >= USERSPACE_END);
    assert!(VMM_RESERVED_BASE > HHDM_BASE);
    assert!(VMM_RESERVED_BASE.is_multiple_of(4096));
    assert!(VMM_RESERVED_SIZE.is_multiple_of(4096));
    assert!(VMM_RESERVED_BASE + VMM_RESERVED_SIZE <= KERNEL_BASE);
    assert!(VMM_BLOCK_POOL_CAPACITY >= 3);
};
