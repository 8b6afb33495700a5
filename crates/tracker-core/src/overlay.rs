//! Deterministic construction of the tree and ring overlays over [0, N).
//!
//! The tree is a balanced binary heap; the ring is a Hamiltonian cycle
//! derived from a DFS over the tree, chosen so that ring neighbours tend
//! to already be tree-close. Both are relabelled afterwards so that ring
//! order coincides with numeric rank order — this is the one place in
//! the tracker with real algorithmic content, everything downstream just
//! looks maps up.

use std::collections::{BTreeSet, HashMap};

use crate::error::{Result, TrackerError};

pub type Rank = i32;

/// The tree and ring topology for a fixed world size, plus convenience
/// lookups used by the peer-wiring handshake.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub n: Rank,
    pub tree: HashMap<Rank, Vec<Rank>>,
    pub parent: HashMap<Rank, Rank>,
    pub ring: HashMap<Rank, (Rank, Rank)>,
}

impl Overlay {
    /// Builds the canonicalised tree + ring topology for `n` ranks.
    pub fn build(n: Rank) -> Result<Self> {
        if n < 1 {
            return Err(TrackerError::InvalidWorldSize(n));
        }

        let (tree, parent) = build_tree(n);
        let ring = build_ring(&tree, &parent, n);
        Ok(canonicalize(tree, parent, ring, n))
    }

    /// Neighbours of `r` in the tree, including the ring's non-sentinel
    /// neighbours (the set the peer-wiring handshake calls `NN`).
    pub fn neighbour_set(&self, r: Rank) -> BTreeSet<Rank> {
        let mut nn: BTreeSet<Rank> = self.tree[&r].iter().copied().collect();
        let (prev, next) = self.ring[&r];
        if prev != -1 && prev != r {
            nn.insert(prev);
        }
        if next != -1 && next != r {
            nn.insert(next);
        }
        nn
    }
}

/// `parent[r] = ((r+1)/2) - 1`, with `tree[r]` the in-bounds subset of
/// `{parent, left child, right child}` in a 1-indexed binary heap.
fn build_tree(n: Rank) -> (HashMap<Rank, Vec<Rank>>, HashMap<Rank, Rank>) {
    let mut tree = HashMap::with_capacity(n as usize);
    let mut parent = HashMap::with_capacity(n as usize);
    for r in 0..n {
        parent.insert(r, (r + 1) / 2 - 1);
        tree.insert(r, neighbours_of(r, n));
    }
    (tree, parent)
}

fn neighbours_of(r: Rank, n: Rank) -> Vec<Rank> {
    let one_indexed = r + 1;
    let mut out = Vec::with_capacity(3);
    if one_indexed > 1 {
        out.push(one_indexed / 2 - 1);
    }
    if one_indexed * 2 - 1 < n {
        out.push(one_indexed * 2 - 1);
    }
    if one_indexed * 2 < n {
        out.push(one_indexed * 2);
    }
    out
}

/// DFS over the tree from root 0, visiting children in ascending rank
/// order for determinism, reversing the last child's subtree sequence
/// before appending it.
fn tree_aligned_order(tree: &HashMap<Rank, Vec<Rank>>, parent: &HashMap<Rank, Rank>, r: Rank) -> Vec<Rank> {
    let children: BTreeSet<Rank> = tree[&r]
        .iter()
        .copied()
        .filter(|&c| c != parent[&r])
        .collect();

    let mut out = vec![r];
    let count = children.len();
    for (i, child) in children.into_iter().enumerate() {
        let mut sub = tree_aligned_order(tree, parent, child);
        if i + 1 == count {
            sub.reverse();
        }
        out.extend(sub);
    }
    out
}

fn build_ring(
    tree: &HashMap<Rank, Vec<Rank>>,
    parent: &HashMap<Rank, Rank>,
    n: Rank,
) -> HashMap<Rank, (Rank, Rank)> {
    let order = tree_aligned_order(tree, parent, 0);
    debug_assert_eq!(order.len() as Rank, n);

    let mut ring = HashMap::with_capacity(n as usize);
    for i in 0..n as usize {
        let prev = order[(i + order.len() - 1) % order.len()];
        let next = order[(i + 1) % order.len()];
        ring.insert(order[i], (prev, next));
    }
    ring
}

/// Walks the ring from rank 0 following `next`; the k-th rank visited is
/// relabelled `k`. Applying this bijection to all three maps makes ring
/// order coincide with numeric rank order while permuting tree
/// neighbours.
fn canonicalize(
    tree: HashMap<Rank, Vec<Rank>>,
    parent: HashMap<Rank, Rank>,
    ring: HashMap<Rank, (Rank, Rank)>,
    n: Rank,
) -> Overlay {
    let mut relabel = HashMap::with_capacity(n as usize);
    relabel.insert(0, 0);
    let mut cur = 0;
    for k in 1..n {
        cur = ring[&cur].1;
        relabel.insert(cur, k);
    }

    let mut new_ring = HashMap::with_capacity(n as usize);
    let mut new_tree = HashMap::with_capacity(n as usize);
    let mut new_parent = HashMap::with_capacity(n as usize);

    for (&old, &(prev, next)) in &ring {
        new_ring.insert(relabel[&old], (relabel[&prev], relabel[&next]));
    }
    for (&old, neighbours) in &tree {
        new_tree.insert(
            relabel[&old],
            neighbours.iter().map(|v| relabel[v]).collect(),
        );
    }
    for (&old, &p) in &parent {
        let new_k = relabel[&old];
        new_parent.insert(new_k, if old == 0 { -1 } else { relabel[&p] });
    }

    Overlay {
        n,
        tree: new_tree,
        parent: new_parent,
        ring: new_ring,
    }
}
