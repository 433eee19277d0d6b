//! # Handle-Based Red-Black Tree
//!
//! An intrusive red-black tree whose nodes live in external storage (see
//! [`Blocks`]). The tree itself only owns the root handle; each node carries
//! its own [`RbLinks`], selected by a [`TreeKey`] adapter. The same block can
//! therefore be a node of several trees at once (one per adapter).
//!
//! The tree orders nodes by [`TreeKey::key`] but never decides what to do with
//! equal keys: [`RbTree::insert`] reports the existing node and lets the caller
//! choose (reject, or chain).
//!
//! ## Invariants
//! - The root is black.
//! - A red node has no red child.
//! - Every root-to-leaf path has the same number of black nodes.

use core::marker::PhantomData;

use crate::block::{Block, Blocks, Color, RbLinks};
use crate::pool::Handle;

/// Selects the key and the link set of a block for one tree.
pub(crate) trait TreeKey {
    fn key(block: &Block) -> u64;
    fn links(block: &Block) -> &RbLinks;
    fn links_mut(block: &mut Block) -> &mut RbLinks;
}

pub(crate) struct RbTree<K> {
    root: Option<Handle>,
    len: usize,
    _key: PhantomData<K>,
}

impl<K: TreeKey> RbTree<K> {
    pub const fn new() -> Self {
        Self {
            root: None,
            len: 0,
            _key: PhantomData,
        }
    }

    /// Number of tree nodes.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    fn links<S: Blocks + ?Sized>(nodes: &S, h: Handle) -> &RbLinks {
        K::links(&nodes[h])
    }

    #[inline]
    fn links_mut<S: Blocks + ?Sized>(nodes: &mut S, h: Handle) -> &mut RbLinks {
        K::links_mut(&mut nodes[h])
    }

    #[inline]
    fn parent<S: Blocks + ?Sized>(nodes: &S, h: Handle) -> Option<Handle> {
        Self::links(nodes, h).parent
    }

    #[inline]
    pub fn left<S: Blocks + ?Sized>(nodes: &S, h: Handle) -> Option<Handle> {
        Self::links(nodes, h).left
    }

    #[inline]
    pub fn right<S: Blocks + ?Sized>(nodes: &S, h: Handle) -> Option<Handle> {
        Self::links(nodes, h).right
    }

    /// Color of a possibly-absent node; absent leaves are black.
    #[inline]
    fn color<S: Blocks + ?Sized>(nodes: &S, h: Option<Handle>) -> Color {
        h.map_or(Color::Black, |h| Self::links(nodes, h).color)
    }

    #[inline]
    fn is_red<S: Blocks + ?Sized>(nodes: &S, h: Option<Handle>) -> bool {
        Self::color(nodes, h) == Color::Red
    }

    #[inline]
    fn set_color<S: Blocks + ?Sized>(nodes: &mut S, h: Handle, color: Color) {
        Self::links_mut(nodes, h).color = color;
    }

    #[inline]
    fn set_parent<S: Blocks + ?Sized>(nodes: &mut S, h: Option<Handle>, parent: Option<Handle>) {
        if let Some(h) = h {
            Self::links_mut(nodes, h).parent = parent;
        }
    }

    /// Point `parent`'s child slot that held `old` at `new` (or the root if
    /// `parent` is `None`).
    fn replace_child<S: Blocks + ?Sized>(
        &mut self,
        nodes: &mut S,
        parent: Option<Handle>,
        old: Handle,
        new: Option<Handle>,
    ) {
        match parent {
            None => self.root = new,
            Some(p) => {
                let links = Self::links_mut(nodes, p);
                if links.left == Some(old) {
                    links.left = new;
                } else {
                    debug_assert_eq!(links.right, Some(old));
                    links.right = new;
                }
            }
        }
    }

    fn rotate_left<S: Blocks + ?Sized>(&mut self, nodes: &mut S, x: Handle) {
        let Some(y) = Self::right(nodes, x) else {
            unreachable!("rotate_left without right child");
        };
        let y_left = Self::left(nodes, y);
        let x_parent = Self::parent(nodes, x);

        Self::links_mut(nodes, x).right = y_left;
        Self::set_parent(nodes, y_left, Some(x));
        Self::links_mut(nodes, y).parent = x_parent;
        self.replace_child(nodes, x_parent, x, Some(y));
        Self::links_mut(nodes, y).left = Some(x);
        Self::links_mut(nodes, x).parent = Some(y);
    }

    fn rotate_right<S: Blocks + ?Sized>(&mut self, nodes: &mut S, x: Handle) {
        let Some(y) = Self::left(nodes, x) else {
            unreachable!("rotate_right without left child");
        };
        let y_right = Self::right(nodes, y);
        let x_parent = Self::parent(nodes, x);

        Self::links_mut(nodes, x).left = y_right;
        Self::set_parent(nodes, y_right, Some(x));
        Self::links_mut(nodes, y).parent = x_parent;
        self.replace_child(nodes, x_parent, x, Some(y));
        Self::links_mut(nodes, y).right = Some(x);
        Self::links_mut(nodes, x).parent = Some(y);
    }

    /// Link `h` into the tree by its key.
    ///
    /// # Errors
    /// If a node with the same key is already linked, nothing is changed and
    /// that node is returned.
    pub fn insert<S: Blocks + ?Sized>(&mut self, nodes: &mut S, h: Handle) -> Result<(), Handle> {
        let key = K::key(&nodes[h]);
        let mut parent = None;
        let mut cursor = self.root;
        let mut go_left = false;

        while let Some(c) = cursor {
            let ck = K::key(&nodes[c]);
            parent = Some(c);
            if key < ck {
                go_left = true;
                cursor = Self::left(nodes, c);
            } else if key > ck {
                go_left = false;
                cursor = Self::right(nodes, c);
            } else {
                return Err(c);
            }
        }

        *Self::links_mut(nodes, h) = RbLinks {
            parent,
            left: None,
            right: None,
            color: Color::Red,
        };
        match parent {
            None => self.root = Some(h),
            Some(p) if go_left => Self::links_mut(nodes, p).left = Some(h),
            Some(p) => Self::links_mut(nodes, p).right = Some(h),
        }
        self.len += 1;
        self.insert_fixup(nodes, h);
        Ok(())
    }

    fn insert_fixup<S: Blocks + ?Sized>(&mut self, nodes: &mut S, mut z: Handle) {
        while let Some(p) = Self::parent(nodes, z) {
            if !Self::is_red(nodes, Some(p)) {
                break;
            }
            // A red node is never the root, so the grandparent exists.
            let Some(g) = Self::parent(nodes, p) else {
                break;
            };

            if Self::left(nodes, g) == Some(p) {
                let uncle = Self::right(nodes, g);
                if let Some(u) = uncle.filter(|&u| Self::is_red(nodes, Some(u))) {
                    Self::set_color(nodes, p, Color::Black);
                    Self::set_color(nodes, u, Color::Black);
                    Self::set_color(nodes, g, Color::Red);
                    z = g;
                    continue;
                }
                let mut p = p;
                if Self::right(nodes, p) == Some(z) {
                    z = p;
                    self.rotate_left(nodes, z);
                    p = Self::parent(nodes, z).unwrap_or(z);
                }
                Self::set_color(nodes, p, Color::Black);
                Self::set_color(nodes, g, Color::Red);
                self.rotate_right(nodes, g);
            } else {
                let uncle = Self::left(nodes, g);
                if let Some(u) = uncle.filter(|&u| Self::is_red(nodes, Some(u))) {
                    Self::set_color(nodes, p, Color::Black);
                    Self::set_color(nodes, u, Color::Black);
                    Self::set_color(nodes, g, Color::Red);
                    z = g;
                    continue;
                }
                let mut p = p;
                if Self::left(nodes, p) == Some(z) {
                    z = p;
                    self.rotate_right(nodes, z);
                    p = Self::parent(nodes, z).unwrap_or(z);
                }
                Self::set_color(nodes, p, Color::Black);
                Self::set_color(nodes, g, Color::Red);
                self.rotate_left(nodes, g);
            }
        }

        if let Some(root) = self.root {
            Self::set_color(nodes, root, Color::Black);
        }
    }

    /// Replace the subtree rooted at `u` with the one rooted at `v`.
    fn transplant<S: Blocks + ?Sized>(&mut self, nodes: &mut S, u: Handle, v: Option<Handle>) {
        let up = Self::parent(nodes, u);
        self.replace_child(nodes, up, u, v);
        Self::set_parent(nodes, v, up);
    }

    /// Unlink `z` from the tree. `z` must currently be a node of this tree.
    pub fn remove<S: Blocks + ?Sized>(&mut self, nodes: &mut S, z: Handle) {
        let z_links = *Self::links(nodes, z);
        let removed_color;
        let x;
        let x_parent;

        match (z_links.left, z_links.right) {
            (None, right) => {
                removed_color = z_links.color;
                x = right;
                x_parent = z_links.parent;
                self.transplant(nodes, z, right);
            }
            (left, None) => {
                removed_color = z_links.color;
                x = left;
                x_parent = z_links.parent;
                self.transplant(nodes, z, left);
            }
            (Some(zl), Some(zr)) => {
                let y = Self::minimum(nodes, zr);
                let y_links = *Self::links(nodes, y);
                removed_color = y_links.color;
                x = y_links.right;

                if y_links.parent == Some(z) {
                    x_parent = Some(y);
                } else {
                    x_parent = y_links.parent;
                    self.transplant(nodes, y, y_links.right);
                    Self::links_mut(nodes, y).right = Some(zr);
                    Self::links_mut(nodes, zr).parent = Some(y);
                }

                self.transplant(nodes, z, Some(y));
                Self::links_mut(nodes, y).left = Some(zl);
                Self::links_mut(nodes, zl).parent = Some(y);
                Self::set_color(nodes, y, z_links.color);
            }
        }

        *Self::links_mut(nodes, z) = RbLinks::default();
        self.len -= 1;

        if removed_color == Color::Black {
            self.remove_fixup(nodes, x, x_parent);
        }
    }

    fn remove_fixup<S: Blocks + ?Sized>(
        &mut self,
        nodes: &mut S,
        mut x: Option<Handle>,
        mut x_parent: Option<Handle>,
    ) {
        while x != self.root && !Self::is_red(nodes, x) {
            let Some(p) = x_parent else {
                break;
            };

            if x == Self::left(nodes, p) {
                // The sibling of a doubly-black position always exists.
                let Some(mut w) = Self::right(nodes, p) else {
                    debug_assert!(false, "red-black sibling missing");
                    break;
                };
                if Self::is_red(nodes, Some(w)) {
                    Self::set_color(nodes, w, Color::Black);
                    Self::set_color(nodes, p, Color::Red);
                    self.rotate_left(nodes, p);
                    let Some(nw) = Self::right(nodes, p) else {
                        break;
                    };
                    w = nw;
                }
                let wl = Self::left(nodes, w);
                let wr = Self::right(nodes, w);
                if !Self::is_red(nodes, wl) && !Self::is_red(nodes, wr) {
                    Self::set_color(nodes, w, Color::Red);
                    x = Some(p);
                    x_parent = Self::parent(nodes, p);
                } else {
                    if !Self::is_red(nodes, wr) {
                        if let Some(wl) = wl {
                            Self::set_color(nodes, wl, Color::Black);
                        }
                        Self::set_color(nodes, w, Color::Red);
                        self.rotate_right(nodes, w);
                        let Some(nw) = Self::right(nodes, p) else {
                            break;
                        };
                        w = nw;
                    }
                    let pc = Self::color(nodes, Some(p));
                    Self::set_color(nodes, w, pc);
                    Self::set_color(nodes, p, Color::Black);
                    if let Some(wr) = Self::right(nodes, w) {
                        Self::set_color(nodes, wr, Color::Black);
                    }
                    self.rotate_left(nodes, p);
                    x = self.root;
                    x_parent = None;
                }
            } else {
                let Some(mut w) = Self::left(nodes, p) else {
                    debug_assert!(false, "red-black sibling missing");
                    break;
                };
                if Self::is_red(nodes, Some(w)) {
                    Self::set_color(nodes, w, Color::Black);
                    Self::set_color(nodes, p, Color::Red);
                    self.rotate_right(nodes, p);
                    let Some(nw) = Self::left(nodes, p) else {
                        break;
                    };
                    w = nw;
                }
                let wl = Self::left(nodes, w);
                let wr = Self::right(nodes, w);
                if !Self::is_red(nodes, wl) && !Self::is_red(nodes, wr) {
                    Self::set_color(nodes, w, Color::Red);
                    x = Some(p);
                    x_parent = Self::parent(nodes, p);
                } else {
                    if !Self::is_red(nodes, wl) {
                        if let Some(wr) = wr {
                            Self::set_color(nodes, wr, Color::Black);
                        }
                        Self::set_color(nodes, w, Color::Red);
                        self.rotate_left(nodes, w);
                        let Some(nw) = Self::left(nodes, p) else {
                            break;
                        };
                        w = nw;
                    }
                    let pc = Self::color(nodes, Some(p));
                    Self::set_color(nodes, w, pc);
                    Self::set_color(nodes, p, Color::Black);
                    if let Some(wl) = Self::left(nodes, w) {
                        Self::set_color(nodes, wl, Color::Black);
                    }
                    self.rotate_right(nodes, p);
                    x = self.root;
                    x_parent = None;
                }
            }
        }

        if let Some(x) = x {
            Self::set_color(nodes, x, Color::Black);
        }
    }

    /// Put `new` into the tree position of `old` without rebalancing.
    ///
    /// `new` must not be linked into this tree and must have the same key.
    pub fn replace<S: Blocks + ?Sized>(&mut self, nodes: &mut S, old: Handle, new: Handle) {
        debug_assert_eq!(K::key(&nodes[old]), K::key(&nodes[new]));
        let links = *Self::links(nodes, old);
        *Self::links_mut(nodes, new) = links;
        self.replace_child(nodes, links.parent, old, Some(new));
        Self::set_parent(nodes, links.left, Some(new));
        Self::set_parent(nodes, links.right, Some(new));
        *Self::links_mut(nodes, old) = RbLinks::default();
    }

    fn minimum<S: Blocks + ?Sized>(nodes: &S, mut h: Handle) -> Handle {
        while let Some(l) = Self::left(nodes, h) {
            h = l;
        }
        h
    }

    fn maximum<S: Blocks + ?Sized>(nodes: &S, mut h: Handle) -> Handle {
        while let Some(r) = Self::right(nodes, h) {
            h = r;
        }
        h
    }

    /// Node with the largest key.
    pub fn last<S: Blocks + ?Sized>(&self, nodes: &S) -> Option<Handle> {
        self.root.map(|r| Self::maximum(nodes, r))
    }

    /// In-order successor of `h`.
    pub fn next<S: Blocks + ?Sized>(nodes: &S, h: Handle) -> Option<Handle> {
        if let Some(r) = Self::right(nodes, h) {
            return Some(Self::minimum(nodes, r));
        }
        let mut child = h;
        let mut parent = Self::parent(nodes, h);
        while let Some(p) = parent {
            if Self::left(nodes, p) == Some(child) {
                return Some(p);
            }
            child = p;
            parent = Self::parent(nodes, p);
        }
        None
    }

    /// Node whose key equals `key`.
    pub fn find<S: Blocks + ?Sized>(&self, nodes: &S, key: u64) -> Option<Handle> {
        let mut cursor = self.root;
        while let Some(c) = cursor {
            let ck = K::key(&nodes[c]);
            cursor = match key.cmp(&ck) {
                core::cmp::Ordering::Less => Self::left(nodes, c),
                core::cmp::Ordering::Greater => Self::right(nodes, c),
                core::cmp::Ordering::Equal => return Some(c),
            };
        }
        None
    }

    /// Node with the smallest key `>= key`.
    pub fn lower_bound<S: Blocks + ?Sized>(&self, nodes: &S, key: u64) -> Option<Handle> {
        let mut best = None;
        let mut cursor = self.root;
        while let Some(c) = cursor {
            if K::key(&nodes[c]) >= key {
                best = Some(c);
                cursor = Self::left(nodes, c);
            } else {
                cursor = Self::right(nodes, c);
            }
        }
        best
    }

    /// Node with the largest key `<= key`.
    pub fn floor<S: Blocks + ?Sized>(&self, nodes: &S, key: u64) -> Option<Handle> {
        let mut best = None;
        let mut cursor = self.root;
        while let Some(c) = cursor {
            if K::key(&nodes[c]) <= key {
                best = Some(c);
                cursor = Self::right(nodes, c);
            } else {
                cursor = Self::left(nodes, c);
            }
        }
        best
    }

    /// Walk the whole tree and check the red-black and ordering invariants.
    ///
    /// Returns the black height.
    #[cfg(test)]
    pub fn validate<S: Blocks + ?Sized>(&self, nodes: &S) -> usize {
        fn walk<K: TreeKey, S: Blocks + ?Sized>(
            nodes: &S,
            h: Option<Handle>,
            parent: Option<Handle>,
            lo: Option<u64>,
            hi: Option<u64>,
            count: &mut usize,
        ) -> usize {
            let Some(h) = h else {
                return 1;
            };
            *count += 1;
            let links = K::links(&nodes[h]);
            let key = K::key(&nodes[h]);
            assert_eq!(links.parent, parent, "parent link mismatch");
            assert!(lo.is_none_or(|lo| key > lo), "ordering violated");
            assert!(hi.is_none_or(|hi| key < hi), "ordering violated");
            if links.color == Color::Red {
                for child in [links.left, links.right].into_iter().flatten() {
                    assert_eq!(K::links(&nodes[child]).color, Color::Black, "red-red");
                }
            }
            let lh = walk::<K, S>(nodes, links.left, Some(h), lo, Some(key), count);
            let rh = walk::<K, S>(nodes, links.right, Some(h), Some(key), hi, count);
            assert_eq!(lh, rh, "black height mismatch");
            lh + usize::from(links.color == Color::Black)
        }

        if let Some(root) = self.root {
            assert_eq!(K::links(&nodes[root]).color, Color::Black, "red root");
        }
        let mut count = 0;
        let height = walk::<K, S>(nodes, self.root, None, None, None, &mut count);
        assert_eq!(count, self.len, "node count mismatch");
        height
    }
}
