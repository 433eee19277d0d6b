//! # Interval Records
//!
//! A [`Block`] describes one interval `[base, base + size)` of a managed
//! range. Every block is linked into three structures at once:
//!
//! | Linkage        | Structure                                   |
//! |----------------|---------------------------------------------|
//! | `addr_links`   | address index ([`AddrTree`](crate::addr_tree::AddrTree)) |
//! | `size_links`   | size index ([`SizeTree`](crate::size_tree::SizeTree)), tree node |
//! | `chain`        | size index, same-size sibling chain         |
//! | `list`         | adjacency list ([`BlockList`](crate::block_list::BlockList)) |
//!
//! All links are [`Handle`]s into the owning [`Pool`](crate::pool::Pool).
//! `Block::default()` is the unlinked state.

use core::ops::IndexMut;

use crate::pool::Handle;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub(crate) enum Color {
    #[default]
    Red,
    Black,
}

/// Red-black tree linkage of one block in one tree.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct RbLinks {
    pub parent: Option<Handle>,
    pub left: Option<Handle>,
    pub right: Option<Handle>,
    pub color: Color,
}

/// Doubly linked list linkage.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct ListLinks {
    pub prev: Option<Handle>,
    pub next: Option<Handle>,
}

/// Where a block sits in the size index.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub(crate) enum SizeSlot {
    /// Not in the size index (allocated, or not yet inserted).
    #[default]
    Detached,
    /// Owns the tree node for its size class.
    Primary,
    /// Chained behind the primary of its size class.
    Sibling,
}

#[derive(Debug, Default)]
pub(crate) struct Block {
    pub base: u64,
    pub size: u64,
    pub allocated: bool,
    pub addr_links: RbLinks,
    pub size_links: RbLinks,
    pub size_slot: SizeSlot,
    pub chain: ListLinks,
    pub list: ListLinks,
}

impl Block {
    /// Exclusive end of the interval.
    #[inline]
    pub const fn end(&self) -> u64 {
        self.base + self.size
    }

    #[inline]
    pub const fn contains(&self, address: u64) -> bool {
        address >= self.base && address - self.base < self.size
    }
}

/// Storage the indices operate on: anything that resolves a [`Handle`] to a [`Block`].
pub(crate) trait Blocks: IndexMut<Handle, Output = Block> {}

impl<T: IndexMut<Handle, Output = Block> + ?Sized> Blocks for T {}
