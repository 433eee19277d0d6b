//! # Adjacency List
//!
//! All blocks of a managed range, free or allocated, in **address order**.
//! Coalescing walks this list: the neighbors of a block are one link away,
//! where the address index would need a fresh descent for each.

use crate::block::{Blocks, ListLinks};
use crate::pool::Handle;

/// Doubly linked, address-ordered list threaded through [`Block::list`](crate::block::Block).
///
/// # Invariants
/// - `head` is the block at the lowest address, `tail` the one at the highest.
/// - For every linked block `b`, `b.end() == next(b).base`.
pub(crate) struct BlockList {
    head: Option<Handle>,
    tail: Option<Handle>,
    len: usize,
}

impl BlockList {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub const fn head(&self) -> Option<Handle> {
        self.head
    }

    #[inline]
    pub fn prev<S: Blocks + ?Sized>(nodes: &S, h: Handle) -> Option<Handle> {
        nodes[h].list.prev
    }

    #[inline]
    pub fn next<S: Blocks + ?Sized>(nodes: &S, h: Handle) -> Option<Handle> {
        nodes[h].list.next
    }

    /// Append `h` at the highest address.
    pub fn push_back<S: Blocks + ?Sized>(&mut self, nodes: &mut S, h: Handle) {
        nodes[h].list = ListLinks {
            prev: self.tail,
            next: None,
        };
        match self.tail {
            Some(tail) => nodes[tail].list.next = Some(h),
            None => self.head = Some(h),
        }
        self.tail = Some(h);
        self.len += 1;
    }

    /// Link `new` immediately after `existing`.
    pub fn insert_after<S: Blocks + ?Sized>(&mut self, nodes: &mut S, existing: Handle, new: Handle) {
        let next = nodes[existing].list.next;
        nodes[new].list = ListLinks {
            prev: Some(existing),
            next,
        };
        nodes[existing].list.next = Some(new);
        match next {
            Some(next) => nodes[next].list.prev = Some(new),
            None => self.tail = Some(new),
        }
        self.len += 1;
    }

    pub fn remove<S: Blocks + ?Sized>(&mut self, nodes: &mut S, h: Handle) {
        let ListLinks { prev, next } = nodes[h].list;
        match prev {
            Some(prev) => nodes[prev].list.next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => nodes[next].list.prev = prev,
            None => self.tail = prev,
        }
        nodes[h].list = ListLinks::default();
        self.len -= 1;
    }
}
