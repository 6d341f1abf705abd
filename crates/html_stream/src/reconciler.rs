//! Removed-node bookkeeping and position resolution.
//!
//! The engine moves nodes during error recovery (adoption agency,
//! foster parenting). A node that shows up in a record's removed list is
//! "dirty" until it is emitted again under its current parent, or found to be
//! unreachable and dropped. Placement tracks, for every emitted node, the live
//! parent it was last emitted under; anchors are only ever chosen among
//! siblings whose placement is current, so every `next_sibling` a unit names
//! is already in the consumer's tree under the same parent.

use crate::live_dom::{LiveDom, LiveId};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
pub struct RemovalReconciler {
    removed: BTreeSet<LiveId>,
    placed: HashMap<LiveId, LiveId>,
}

impl RemovalReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_removed(&mut self, node: LiveId) {
        self.removed.insert(node);
    }

    pub fn is_removed(&self, node: LiveId) -> bool {
        self.removed.contains(&node)
    }

    pub fn removed_len(&self) -> usize {
        self.removed.len()
    }

    /// Dirty nodes in id order.
    pub fn removed_nodes(&self) -> Vec<LiveId> {
        self.removed.iter().copied().collect()
    }

    /// Record that `node` was emitted under `parent`; clears its dirty mark.
    pub fn place(&mut self, node: LiveId, parent: LiveId) {
        self.placed.insert(node, parent);
        self.removed.remove(&node);
    }

    /// Drop every trace of `node`. A later addition re-emits it as a move.
    pub fn forget(&mut self, node: LiveId) {
        self.placed.remove(&node);
        self.removed.remove(&node);
    }

    /// Whether the consumer already holds `node` under `parent`.
    pub fn is_placed_under(&self, node: LiveId, parent: LiveId) -> bool {
        self.placed.get(&node) == Some(&parent) && !self.removed.contains(&node)
    }

    /// First following live sibling of `node` already placed under `parent`.
    pub fn anchor(&self, dom: &LiveDom, node: LiveId, parent: LiveId) -> Option<LiveId> {
        dom.following_siblings(node)
            .iter()
            .copied()
            .find(|&sibling| self.is_placed_under(sibling, parent))
    }

    /// Live children of `parent` the consumer does not hold there yet.
    pub fn unplaced_children(&self, dom: &LiveDom, parent: LiveId) -> Vec<LiveId> {
        dom.children(parent)
            .iter()
            .copied()
            .filter(|&child| !self.is_placed_under(child, parent))
            .collect()
    }
}
