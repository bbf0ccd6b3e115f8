//! Balanced-tree backend: an AVL tree over populated pixels only.
//!
//! Allocates one node per non-empty pixel, keyed by pixel id, so memory
//! tracks sky coverage instead of resolution. Lookup and insert are
//! O(log n) over populated pixels, which is the right trade at fine
//! orders where the dense table would dwarf the data.
//!
//! Nodes live in an arena and link to each other by index; rotations
//! rewrite indices. Parent links make the post-insert rebalance walk the
//! same bottom-up pass a pointer-based AVL would do.

use super::PixelBucket;
use crate::errors::{CrossmatchError, Result};

#[derive(Debug)]
pub(super) struct TreeStore {
    nodes: Vec<AvlNode>,
    root: Option<u32>,
}

#[derive(Debug)]
struct AvlNode {
    bucket: PixelBucket,
    /// Subtree with keys less than this node's.
    before: Option<u32>,
    /// Subtree with keys greater than this node's.
    after: Option<u32>,
    up: Option<u32>,
    /// Height of this node; a leaf is 1.
    height: i16,
    /// height(before) - height(after).
    imbalance: i16,
}

impl TreeStore {
    pub(super) fn new() -> Self {
        TreeStore {
            nodes: Vec::new(),
            root: None,
        }
    }

    pub(super) fn get(&self, pix: u64) -> Option<&PixelBucket> {
        self.search(pix).map(|n| &self.nodes[n as usize].bucket)
    }

    pub(super) fn get_mut(&mut self, pix: u64) -> Option<&mut PixelBucket> {
        self.search(pix)
            .map(|n| &mut self.nodes[n as usize].bucket)
    }

    /// Bucket for `pix`, inserted and rebalanced on first touch. A
    /// duplicate key returns the existing node untouched.
    pub(super) fn get_or_insert(
        &mut self,
        pix: u64,
        order: u32,
    ) -> Result<(&mut PixelBucket, bool)> {
        let (node, created) = self.locate_or_insert(pix, order)?;
        Ok((&mut self.nodes[node as usize].bucket, created))
    }

    pub(super) fn clear_tested_flags(&mut self) {
        for node in &mut self.nodes {
            node.bucket.tested = [false; 8];
        }
    }

    fn search(&self, pix: u64) -> Option<u32> {
        let mut current = self.root;
        while let Some(n) = current {
            let node = &self.nodes[n as usize];
            current = if pix < node.bucket.id {
                node.before
            } else if pix > node.bucket.id {
                node.after
            } else {
                return Some(n);
            };
        }
        None
    }

    fn locate_or_insert(&mut self, pix: u64, order: u32) -> Result<(u32, bool)> {
        let mut current = self.root;
        let mut attach: Option<(u32, bool)> = None; // (parent, as-before-child)
        while let Some(n) = current {
            let node = &self.nodes[n as usize];
            if pix < node.bucket.id {
                attach = Some((n, true));
                current = node.before;
            } else if pix > node.bucket.id {
                attach = Some((n, false));
                current = node.after;
            } else {
                return Ok((n, false));
            }
        }

        self.nodes
            .try_reserve(1)
            .map_err(|_| CrossmatchError::Allocation("pixel tree arena"))?;
        let new = self.nodes.len() as u32;
        self.nodes.push(AvlNode {
            bucket: PixelBucket::new(pix, order),
            before: None,
            after: None,
            up: attach.map(|(parent, _)| parent),
            height: 1,
            imbalance: 0,
        });
        match attach {
            None => self.root = Some(new),
            Some((parent, true)) => self.nodes[parent as usize].before = Some(new),
            Some((parent, false)) => self.nodes[parent as usize].after = Some(new),
        }
        self.rebalance_from(new);
        Ok((new, true))
    }

    fn height_of(&self, node: Option<u32>) -> i16 {
        node.map_or(0, |n| self.nodes[n as usize].height)
    }

    /// Recompute height and imbalance of `n`, assuming correct children.
    fn recompute_height(&mut self, n: u32) {
        let h_before = self.height_of(self.nodes[n as usize].before);
        let h_after = self.height_of(self.nodes[n as usize].after);
        let node = &mut self.nodes[n as usize];
        node.imbalance = h_before - h_after;
        node.height = h_before.max(h_after) + 1;
    }

    /// Point the parent's child link (or the root) from `old` to `new`.
    fn replace_child(&mut self, up: Option<u32>, old: u32, new: u32) {
        match up {
            None => self.root = Some(new),
            Some(parent) => {
                let parent = &mut self.nodes[parent as usize];
                if parent.after == Some(old) {
                    parent.after = Some(new);
                } else {
                    parent.before = Some(new);
                }
            }
        }
    }

    /// ```text
    ///     P                B
    ///    / \              / \
    ///   B   Z    ==>     X   P
    ///  / \                  / \
    /// X   Y                Y   Z
    /// ```
    fn rotate_before(&mut self, p: u32) -> u32 {
        let b = match self.nodes[p as usize].before {
            Some(b) => b,
            None => return p,
        };
        let y = self.nodes[b as usize].after;
        self.nodes[b as usize].up = self.nodes[p as usize].up;
        self.nodes[b as usize].after = Some(p);
        self.nodes[p as usize].up = Some(b);
        self.nodes[p as usize].before = y;
        if let Some(y) = y {
            self.nodes[y as usize].up = Some(p);
        }
        self.recompute_height(p);
        self.recompute_height(b);
        b
    }

    ///     P                A
    ///    / \              / \
    ///   X   A    ==>     P   Z
    ///      / \          / \
    ///     Y   Z        X   Y
    fn rotate_after(&mut self, p: u32) -> u32 {
        let a = match self.nodes[p as usize].after {
            Some(a) => a,
            None => return p,
        };
        let y = self.nodes[a as usize].before;
        self.nodes[a as usize].up = self.nodes[p as usize].up;
        self.nodes[a as usize].before = Some(p);
        self.nodes[p as usize].up = Some(a);
        self.nodes[p as usize].after = y;
        if let Some(y) = y {
            self.nodes[y as usize].up = Some(p);
        }
        self.recompute_height(p);
        self.recompute_height(a);
        a
    }

    /// Rebalance from `start` up to the root, rotating wherever the
    /// imbalance reaches 2. Single rotation for outside-heavy subtrees,
    /// double (child first, then this node) for inside-heavy ones.
    fn rebalance_from(&mut self, start: u32) {
        let mut current = Some(start);
        while let Some(n) = current {
            self.recompute_height(n);
            let imbalance = self.nodes[n as usize].imbalance;
            let mut top = n;
            if imbalance >= 2 {
                if let Some(b) = self.nodes[n as usize].before {
                    if self.nodes[b as usize].imbalance < 0 {
                        let rotated = self.rotate_after(b);
                        self.nodes[n as usize].before = Some(rotated);
                    }
                }
                let up = self.nodes[n as usize].up;
                top = self.rotate_before(n);
                self.replace_child(up, n, top);
            } else if imbalance <= -2 {
                if let Some(a) = self.nodes[n as usize].after {
                    if self.nodes[a as usize].imbalance > 0 {
                        let rotated = self.rotate_before(a);
                        self.nodes[n as usize].after = Some(rotated);
                    }
                }
                let up = self.nodes[n as usize].up;
                top = self.rotate_after(n);
                self.replace_child(up, n, top);
            }
            current = self.nodes[top as usize].up;
        }
    }
}
