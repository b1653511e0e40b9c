//! The packed-forest chart cell types (spec §3.2): `EdgeSet` (a bitset
//! over the input graph's ≤256 edges), `NodeMapping` (a fragment's
//! external-node bindings into the input graph), and `AndNode`, the
//! arena-indexed realisation of one packed-forest AND-node. OR-nodes are
//! not a separate type: they're the circular `next` cycle an `AndNode`
//! belongs to, keyed by `(EdgeSet, NodeMapping)` (spec §3.2, §9 — arena +
//! index instead of the original's raw-pointer cycle).

use fixedbitset::FixedBitSet;

use crate::eds::MAX_GRAPH_EDGE_COUNT;
use crate::hypergraph::NodeIdx;
use crate::label::LabelHash;

/// Sentinel marking an unbound external-node slot in a `NodeMapping`.
pub const UNBOUND: u8 = 0xFF;

/// Index of an `AndNode` within a `Pool`'s arena. Also doubles as the
/// identity of the OR-node it belongs to: looking an `AndNodeId` up in
/// the pool's dedup table always yields the *canonical* (lowest-index)
/// member of its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AndNodeId(pub u32);

/// Coverage of the input graph's edges consumed by one derivation.
/// Disjointness of children's edge sets, and full coverage at the root,
/// are the chart's core invariants (spec §3.2, §4.3).
#[derive(Debug, Clone)]
pub struct EdgeSet(pub FixedBitSet);

impl EdgeSet {
    pub fn empty() -> Self {
        EdgeSet(FixedBitSet::with_capacity(MAX_GRAPH_EDGE_COUNT))
    }

    pub fn singleton(edge: usize) -> Self {
        let mut s = Self::empty();
        s.insert(edge);
        s
    }

    pub fn insert(&mut self, edge: usize) {
        self.0.grow(edge + 1);
        self.0.insert(edge);
    }

    pub fn remove(&mut self, edge: usize) {
        if edge < self.0.len() {
            self.0.set(edge, false);
        }
    }

    pub fn contains(&self, edge: usize) -> bool {
        self.0.contains(edge)
    }

    pub fn is_disjoint(&self, other: &EdgeSet) -> bool {
        self.0.is_disjoint(&other.0)
    }

    pub fn union(&self, other: &EdgeSet) -> EdgeSet {
        let mut out = self.0.clone();
        let grown = out.len().max(other.0.len());
        out.grow(grown);
        let mut rhs = other.0.clone();
        rhs.grow(grown);
        out.union_with(&rhs);
        EdgeSet(out)
    }

    pub fn count(&self) -> usize {
        self.0.count_ones(..)
    }

    pub fn is_full_coverage(&self, total_edges: usize) -> bool {
        self.count() == total_edges
    }
}

impl PartialEq for EdgeSet {
    fn eq(&self, other: &Self) -> bool {
        // FixedBitSet::eq requires equal length; pad the shorter one
        // rather than risk false inequality between two logically-equal
        // sets built to different capacities.
        let len = self.0.len().max(other.0.len());
        let mut a = self.0.clone();
        a.grow(len);
        let mut b = other.0.clone();
        b.grow(len);
        a == b
    }
}
impl Eq for EdgeSet {}

impl std::hash::Hash for EdgeSet {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for block in self.0.as_slice() {
            block.hash(state);
        }
    }
}

/// A rule fragment's external-node bindings into the input graph,
/// indexed by external-node position (spec §3.2). `MAX_SHRG_NODE_COUNT`
/// (16) bounds a fragment's arity, so a fixed array suffices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeMapping(pub [u8; 16]);

impl NodeMapping {
    pub fn unbound() -> Self {
        NodeMapping([UNBOUND; 16])
    }

    pub fn get(&self, position: usize) -> Option<NodeIdx> {
        let v = self.0[position];
        if v == UNBOUND {
            None
        } else {
            Some(NodeIdx(v as u32))
        }
    }

    pub fn set(&mut self, position: usize, node: NodeIdx) {
        debug_assert!(node.0 < UNBOUND as u32, "graph node index must fit a u8");
        self.0[position] = node.0 as u8;
    }

    /// Whether `other` agrees with `self` on every position both have
    /// bound — the join condition used when combining a partial rule
    /// instantiation with a candidate child (spec §4.3).
    pub fn compatible_with(&self, other: &NodeMapping) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(&a, &b)| a == UNBOUND || b == UNBOUND || a == b)
    }

    /// Merges `other` into `self`, taking `other`'s binding wherever
    /// `self` was unbound. Caller must have checked `compatible_with`.
    pub fn merged_with(&self, other: &NodeMapping) -> NodeMapping {
        let mut out = *self;
        for i in 0..16 {
            if out.0[i] == UNBOUND {
                out.0[i] = other.0[i];
            }
        }
        out
    }
}

/// One packed-forest AND-node: a specific rule alignment combining
/// specific children, with the edge coverage and external-node bindings
/// that make it (together with its cycle-mates) a chart cell (spec
/// §3.2, §4.3).
#[derive(Debug, Clone)]
pub struct AndNode {
    pub id: AndNodeId,
    pub rule_index: usize,
    pub cfg_rule_index: usize,
    /// `(label, arity, is_terminal=false)` hash of the rule's LHS,
    /// forming part of the OR-node dedup key alongside `edge_set` and
    /// `node_mapping` (spec §3.2's "for each `(label_hash, edge_set,
    /// boundary_mapping)` at most one cycle exists").
    pub label_hash: LabelHash,
    pub edge_set: EdgeSet,
    /// Bindings of `rule.external_nodes`, in that order — this is the
    /// OR-node's public interface, shared with whatever larger item
    /// eventually consumes it as a child.
    pub node_mapping: NodeMapping,
    /// Canonical child AND-node for each of the rule's non-terminal
    /// edges, in `rule.non_terminal_edges` order. Each child id is a
    /// cycle member — the *specific* alternative this AND-node chose,
    /// not necessarily the OR-node's canonical id.
    pub children: Vec<AndNodeId>,
    /// This rule alternative's own log-probability contribution
    /// (`cfg_rule.score`); the combined inside score is computed
    /// separately by `forest::inside_outside`.
    pub local_score: f64,
    /// Next member of this AND-node's OR-node cycle; a lone node's
    /// `next` points to itself.
    pub next: AndNodeId,
}
