//! # Kernel Memory Layout
//!
//! Compile-time constants describing where things live in the kernel's
//! virtual address space. Subsystems that carve up address space take their
//! bounds from here so that the layout is defined in exactly one place.
//!
//! ```text
//! 0x0000_0000_0000_0000 ┌─────────────────────────────────┐
//!                       │        User Space               │
//! USERSPACE_END         ├─────────────────────────────────┤
//!                       │        Guard Region             │
//! HHDM_BASE             ├─────────────────────────────────┤
//!                       │   Higher Half Direct Map        │
//! VMM_RESERVED_BASE     ├─────────────────────────────────┤
//!                       │   Kernel VMM window             │
//!                       │   (VMM_RESERVED_SIZE bytes)     │
//!                       ├─────────────────────────────────┤
//!                       │        unused                   │
//! KERNEL_BASE           ├─────────────────────────────────┤
//!                       │       Kernel image              │
//! 0xFFFF_FFFF_FFFF_FFFF └─────────────────────────────────┘
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod memory;
