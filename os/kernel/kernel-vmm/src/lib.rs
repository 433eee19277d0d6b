//! # Kernel Virtual Address Range Allocator
//!
//! This crate hands out and takes back ranges of virtual address space. It
//! does not touch page tables or physical frames; it only keeps the books on
//! which parts of a managed window are in use, so that callers mapping
//! memory know where to put it.
//!
//! ## Architecture Overview
//!
//! Every interval of a window, free or allocated, is one record in a
//! fixed-capacity pool. The same records are threaded through three
//! structures:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Range Allocator ([`vmm`])           │
//! │    • init / alloc / alloc_aligned / reserve / free  │
//! │    • split on alloc, coalesce on free               │
//! └──────┬──────────────────┬─────────────────┬─────────┘
//!        │                  │                 │
//! ┌──────▼───────┐  ┌───────▼───────┐  ┌──────▼────────┐
//! │ Address index│  │  Size index   │  │ Adjacency list│
//! │ RB tree, all │  │ RB tree, free │  │ address order │
//! │ blocks       │  │ blocks, chains│  │ all blocks    │
//! └──────┬───────┘  └───────┬───────┘  └──────┬────────┘
//!        └──────────────────┼─────────────────┘
//!                   ┌───────▼───────┐
//!                   │  Object pool  │
//!                   │  N records    │
//!                   └───────────────┘
//! ```
//!
//! - **Address index**: finds the block owning an address in O(log n).
//! - **Size index**: best-fit lookup of the smallest free block that is large
//!   enough, in O(log n). Blocks of equal size share one tree node.
//! - **Adjacency list**: O(1) access to the address neighbors of a block for
//!   coalescing.
//! - **Object pool**: supplies records without a heap. The VMM sits below
//!   the heap in the boot order, so it cannot allocate through it.
//!
//! All links are [`pool::Handle`]s rather than references.
//!
//! ## Allocation
//!
//! `alloc` takes the smallest free interval that fits and carves the request
//! off its front; `alloc_aligned` carves at the first aligned address and may
//! leave a free remainder on both sides. A split that would need more pool
//! records than are left fails before anything is modified.
//!
//! ## Concurrency
//!
//! A [`vmm::Vmm`] is a plain single-owner structure. Shared ranges go behind a
//! [`locked::LockedVmm`]; the kernel's own window is [`kernel_range`].
//!
//! ## Usage
//! ```rust
//! use kernel_vmm::{VirtualAddress, vmm::{Vmm, VmmError}};
//!
//! let mut vmm = Vmm::<16>::new();
//! vmm.init(VirtualAddress::new(0xFFFF_C000_0000_0000), 0x10_0000).unwrap();
//!
//! let a = vmm.alloc(0x4000).unwrap();
//! let b = vmm.alloc_aligned(0x1000, 0x1000).unwrap();
//! assert_eq!(a.as_u64(), 0xFFFF_C000_0000_0000);
//! assert_eq!(b.as_u64(), 0xFFFF_C000_0000_4000);
//!
//! vmm.free(a).unwrap();
//! assert_eq!(vmm.free(a), Err(VmmError::InvalidAddress(a)));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod addr_tree;
mod block;
mod block_list;
mod rbtree;
mod size_tree;

pub mod addresses;
pub mod kernel_range;
pub mod locked;
pub mod pool;
pub mod vmm;

pub use addresses::VirtualAddress;
pub use locked::LockedVmm;
pub use vmm::{Interval, Vmm, VmmError, VmmInitError};
