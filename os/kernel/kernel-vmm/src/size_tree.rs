//! # Size Index
//!
//! The free blocks of a managed range, keyed by size. Sizes are not unique,
//! so each tree node represents one *size class*: the block owning the node
//! is the class primary, and every further block of the same size is chained
//! behind it.
//!
//! ```text
//!              [64]                 tree nodes: one per distinct size
//!             /    \
//!          [16]    [256] ─► b7 ─► b3    same-size chain, newest first
//! ```
//!
//! Removing a primary that still has siblings promotes the first sibling into
//! the tree node in place, so the tree shape (and its balance) is untouched.

use crate::block::{Block, Blocks, ListLinks, RbLinks, SizeSlot};
use crate::pool::Handle;
use crate::rbtree::{RbTree, TreeKey};

pub(crate) enum BySize {}

impl TreeKey for BySize {
    #[inline]
    fn key(block: &Block) -> u64 {
        block.size
    }

    #[inline]
    fn links(block: &Block) -> &RbLinks {
        &block.size_links
    }

    #[inline]
    fn links_mut(block: &mut Block) -> &mut RbLinks {
        &mut block.size_links
    }
}

pub(crate) struct SizeTree {
    tree: RbTree<BySize>,
    /// Indexed blocks, including chained siblings.
    len: usize,
}

impl SizeTree {
    pub const fn new() -> Self {
        Self {
            tree: RbTree::new(),
            len: 0,
        }
    }

    /// Number of indexed blocks.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Number of distinct sizes.
    #[inline]
    pub const fn classes(&self) -> usize {
        self.tree.len()
    }

    /// Index `h` by its current size. `h` must not be indexed already.
    pub fn insert<S: Blocks + ?Sized>(&mut self, nodes: &mut S, h: Handle) {
        debug_assert_eq!(nodes[h].size_slot, SizeSlot::Detached);

        match self.tree.insert(nodes, h) {
            Ok(()) => {
                let block = &mut nodes[h];
                block.size_slot = SizeSlot::Primary;
                block.chain = ListLinks::default();
            }
            Err(primary) => {
                let first = nodes[primary].chain.next;
                {
                    let block = &mut nodes[h];
                    block.size_slot = SizeSlot::Sibling;
                    block.chain = ListLinks {
                        prev: Some(primary),
                        next: first,
                    };
                }
                if let Some(first) = first {
                    nodes[first].chain.prev = Some(h);
                }
                nodes[primary].chain.next = Some(h);
            }
        }
        self.len += 1;
    }

    /// Remove `h` from the index.
    pub fn remove<S: Blocks + ?Sized>(&mut self, nodes: &mut S, h: Handle) {
        match nodes[h].size_slot {
            SizeSlot::Detached => {
                debug_assert!(false, "removing a block that is not size-indexed");
                return;
            }
            SizeSlot::Primary => {
                if let Some(heir) = nodes[h].chain.next {
                    let rest = nodes[heir].chain.next;
                    self.tree.replace(nodes, h, heir);
                    {
                        let block = &mut nodes[heir];
                        block.size_slot = SizeSlot::Primary;
                        block.chain = ListLinks {
                            prev: None,
                            next: rest,
                        };
                    }
                    if let Some(rest) = rest {
                        nodes[rest].chain.prev = Some(heir);
                    }
                } else {
                    self.tree.remove(nodes, h);
                }
            }
            SizeSlot::Sibling => {
                let ListLinks { prev, next } = nodes[h].chain;
                if let Some(prev) = prev {
                    nodes[prev].chain.next = next;
                }
                if let Some(next) = next {
                    nodes[next].chain.prev = prev;
                }
            }
        }

        let block = &mut nodes[h];
        block.size_slot = SizeSlot::Detached;
        block.chain = ListLinks::default();
        block.size_links = RbLinks::default();
        self.len -= 1;
    }

    /// A block of the smallest indexed size `>= min_size`.
    ///
    /// Within a size class the most recently inserted block is preferred.
    pub fn find_at_least<S: Blocks + ?Sized>(&self, nodes: &S, min_size: u64) -> Option<Handle> {
        let class = self.tree.lower_bound(nodes, min_size)?;
        Some(nodes[class].chain.next.unwrap_or(class))
    }

    /// All blocks of size `>= min_size` in ascending size order, in the same
    /// within-class order as [`find_at_least`](Self::find_at_least).
    pub fn candidates<'a, S: Blocks + ?Sized>(&self, nodes: &'a S, min_size: u64) -> Candidates<'a, S> {
        let class = self.tree.lower_bound(nodes, min_size);
        Candidates {
            nodes,
            class,
            member: class.map(|c| nodes[c].chain.next.unwrap_or(c)),
        }
    }

    /// Size of the largest indexed block.
    pub fn largest<S: Blocks + ?Sized>(&self, nodes: &S) -> Option<u64> {
        self.tree.last(nodes).map(|h| nodes[h].size)
    }

    /// Check tree invariants and chain linkage; returns the indexed blocks seen.
    #[cfg(test)]
    pub fn validate<S: Blocks + ?Sized>(&self, nodes: &S) -> usize {
        self.tree.validate(nodes);
        let mut seen = 0;
        for h in self.candidates(nodes, 0) {
            let block = &nodes[h];
            assert!(!block.allocated, "allocated block in size index");
            match block.size_slot {
                SizeSlot::Primary => assert_eq!(block.chain.prev, None),
                SizeSlot::Sibling => {
                    let prev = block.chain.prev.expect("sibling without predecessor");
                    assert_eq!(nodes[prev].chain.next, Some(h));
                    assert_eq!(nodes[prev].size, block.size, "mixed sizes in chain");
                }
                SizeSlot::Detached => panic!("detached block reachable from size index"),
            }
            seen += 1;
        }
        assert_eq!(seen, self.len, "size index count mismatch");
        seen
    }
}

/// Iterator returned by [`SizeTree::candidates`].
pub(crate) struct Candidates<'a, S: ?Sized> {
    nodes: &'a S,
    class: Option<Handle>,
    member: Option<Handle>,
}

impl<S: Blocks + ?Sized> Iterator for Candidates<'_, S> {
    type Item = Handle;

    fn next(&mut self) -> Option<Handle> {
        let current = self.member?;
        let class = self.class?;
        let block = &self.nodes[current];

        self.member = match (block.chain.next, block.size_slot) {
            (Some(next), SizeSlot::Sibling) => Some(next),
            (None, SizeSlot::Sibling) => Some(class),
            _ => {
                self.class = RbTree::<BySize>::next(self.nodes, class);
                self.class
                    .map(|c| self.nodes[c].chain.next.unwrap_or(c))
            }
        };
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pool;

    fn free_block(pool: &mut Pool<Block, 32>, base: u64, size: u64) -> Handle {
        let h = pool.acquire().unwrap();
        pool[h].base = base;
        pool[h].size = size;
        h
    }

    #[test]
    fn equal_sizes_share_one_tree_node() {
        let mut pool = Pool::<Block, 32>::new();
        let mut sizes = SizeTree::new();
        let a = free_block(&mut pool, 0x0000, 64);
        let b = free_block(&mut pool, 0x1000, 64);
        let c = free_block(&mut pool, 0x2000, 64);
        for h in [a, b, c] {
            sizes.insert(&mut pool, h);
        }
        assert_eq!(sizes.len(), 3);
        assert_eq!(sizes.classes(), 1);
        assert_eq!(sizes.validate(&pool), 3);
        // newest sibling first
        assert_eq!(sizes.find_at_least(&pool, 1), Some(c));
    }

    #[test]
    fn best_fit_picks_smallest_adequate_class() {
        let mut pool = Pool::<Block, 32>::new();
        let mut sizes = SizeTree::new();
        for (base, size) in [(0, 16), (0x100, 64), (0x1000, 256)] {
            let h = free_block(&mut pool, base, size);
            sizes.insert(&mut pool, h);
        }
        let pick = |min| sizes.find_at_least(&pool, min).map(|h| pool[h].size);
        assert_eq!(pick(40), Some(64));
        assert_eq!(pick(16), Some(16));
        assert_eq!(pick(65), Some(256));
        assert_eq!(pick(257), None);
        assert_eq!(sizes.largest(&pool), Some(256));
    }

    #[test]
    fn removing_primary_promotes_sibling() {
        let mut pool = Pool::<Block, 32>::new();
        let mut sizes = SizeTree::new();
        let small = free_block(&mut pool, 0, 8);
        let a = free_block(&mut pool, 0x100, 32);
        let b = free_block(&mut pool, 0x200, 32);
        let big = free_block(&mut pool, 0x300, 128);
        for h in [small, a, b, big] {
            sizes.insert(&mut pool, h);
        }
        assert_eq!(pool[a].size_slot, SizeSlot::Primary);

        sizes.remove(&mut pool, a);
        assert_eq!(pool[a].size_slot, SizeSlot::Detached);
        assert_eq!(pool[b].size_slot, SizeSlot::Primary);
        assert_eq!(sizes.classes(), 3);
        sizes.validate(&pool);

        sizes.remove(&mut pool, b);
        assert_eq!(sizes.classes(), 2);
        assert_eq!(sizes.find_at_least(&pool, 9), Some(big));
        sizes.validate(&pool);
    }

    #[test]
    fn removing_middle_sibling_relinks_chain() {
        let mut pool = Pool::<Block, 32>::new();
        let mut sizes = SizeTree::new();
        let hs: Vec<_> = (0..4)
            .map(|i| free_block(&mut pool, i * 0x100, 48))
            .collect();
        for &h in &hs {
            sizes.insert(&mut pool, h);
        }
        // chain: hs[0] (primary) -> hs[3] -> hs[2] -> hs[1]
        sizes.remove(&mut pool, hs[2]);
        let order: Vec<_> = sizes.candidates(&pool, 0).collect();
        assert_eq!(order, vec![hs[3], hs[1], hs[0]]);
        sizes.validate(&pool);
    }

    #[test]
    fn candidates_walk_classes_in_ascending_order() {
        let mut pool = Pool::<Block, 32>::new();
        let mut sizes = SizeTree::new();
        for (i, size) in [300_u64, 20, 20, 90, 300, 5].into_iter().enumerate() {
            let h = free_block(&mut pool, i as u64 * 0x1000, size);
            sizes.insert(&mut pool, h);
        }
        let walked: Vec<_> = sizes
            .candidates(&pool, 20)
            .map(|h| pool[h].size)
            .collect();
        assert_eq!(walked, vec![20, 20, 90, 300, 300]);
    }
}
