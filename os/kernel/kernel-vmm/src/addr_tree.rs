//! # Address Index
//!
//! Every block of a managed range, free or allocated, keyed by its base
//! address. Keys are unique: the blocks tile the range, so two blocks can
//! never share a base.

use crate::block::{Block, Blocks, RbLinks};
use crate::pool::Handle;
use crate::rbtree::{RbTree, TreeKey};

pub(crate) enum ByBase {}

impl TreeKey for ByBase {
    #[inline]
    fn key(block: &Block) -> u64 {
        block.base
    }

    #[inline]
    fn links(block: &Block) -> &RbLinks {
        &block.addr_links
    }

    #[inline]
    fn links_mut(block: &mut Block) -> &mut RbLinks {
        &mut block.addr_links
    }
}

/// A second block claimed a base address that is already indexed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("duplicate block base 0x{base:016X}")]
pub(crate) struct DuplicateBase {
    pub base: u64,
}

pub(crate) struct AddrTree {
    tree: RbTree<ByBase>,
}

impl AddrTree {
    pub const fn new() -> Self {
        Self {
            tree: RbTree::new(),
        }
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Index `h` by its current base.
    ///
    /// # Errors
    /// [`DuplicateBase`] if another block already owns that base; the tree is
    /// left unchanged.
    pub fn insert<S: Blocks + ?Sized>(&mut self, nodes: &mut S, h: Handle) -> Result<(), DuplicateBase> {
        self.tree
            .insert(nodes, h)
            .map_err(|existing| DuplicateBase {
                base: nodes[existing].base,
            })
    }

    pub fn remove<S: Blocks + ?Sized>(&mut self, nodes: &mut S, h: Handle) {
        self.tree.remove(nodes, h);
    }

    /// The block starting exactly at `base`.
    pub fn find<S: Blocks + ?Sized>(&self, nodes: &S, base: u64) -> Option<Handle> {
        self.tree.find(nodes, base)
    }

    /// The block whose range contains `address`.
    pub fn find_containing<S: Blocks + ?Sized>(&self, nodes: &S, address: u64) -> Option<Handle> {
        self.tree
            .floor(nodes, address)
            .filter(|&h| nodes[h].contains(address))
    }

    #[cfg(test)]
    pub fn validate<S: Blocks + ?Sized>(&self, nodes: &S) {
        self.tree.validate(nodes);
    }
}
