//! SHRG rule, CFG projection, and the grammar as a whole. Ported from
//! `synchronous_hyperedge_replacement_grammar.hpp`'s `SHRG`/`CFGRule`/
//! `CFGItem`.

use crate::hypergraph::{EdgeIdx, Hypergraph, NodeIdx};
use crate::label::Label;

pub const MAX_SHRG_EDGE_COUNT: usize = 32;
pub const MAX_SHRG_NODE_COUNT: usize = 16;

/// One item of a `CfgRule`'s right-hand side: either a bare string
/// literal (not aligned to any fragment edge) or an alignment to one
/// of the rule's hyperedges.
#[derive(Debug, Clone, PartialEq)]
pub enum CfgItem {
    Literal(String),
    Aligned(EdgeIdx),
}

/// A synchronous CFG rule paired with one SHRG rule. A single SHRG rule
/// may be aligned to several `CfgRule`s (spec §3.1).
#[derive(Debug, Clone)]
pub struct CfgRule {
    pub label: Label,
    /// Index into the grammar's dense, load-order `rules` vector.
    /// Unique across all rules of a grammar (enforced at load time).
    pub shrg_index: usize,
    /// `log(count) - log(total)` per spec §6.1; `-inf` is rejected at
    /// load time.
    pub score: f64,
    pub items: Vec<CfgItem>,
}

/// A single SHRG rule: `(label, hypergraph-fragment, external_nodes,
/// terminal_edges, non_terminal_edges, cfg_rules)` (spec §3.1).
#[derive(Debug, Clone)]
pub struct ShrgRule {
    pub label: Label,
    pub fragment: Hypergraph<(), ()>,
    /// Ordered external (interface) nodes of the fragment.
    pub external_nodes: Vec<NodeIdx>,
    /// Terminal edges, ordered by the DFS-with-shared-node-preference
    /// traversal of spec §4.1. Populated by the grammar loader; may be
    /// re-ordered by `grammar::preindex::build`.
    pub terminal_edges: Vec<EdgeIdx>,
    /// Non-terminal edges, ordered ascending by count of linked `Free`
    /// nodes (spec §4.1), so boundary nodes bind as early as possible.
    pub non_terminal_edges: Vec<EdgeIdx>,
    pub cfg_rules: Vec<CfgRule>,
}

impl ShrgRule {
    /// All fragment edges, terminal and non-terminal together.
    pub fn all_edges(&self) -> Vec<EdgeIdx> {
        let mut v = self.terminal_edges.clone();
        v.extend(self.non_terminal_edges.iter().copied());
        v
    }

    pub fn arity(&self) -> usize {
        self.external_nodes.len()
    }
}
