//! Merge primitives shared by every indexing strategy (spec §4.3): DFS
//! backtracking terminal-edge matching, node-mapping compatibility, and
//! the external-node projection that becomes an `AndNode`'s public
//! `NodeMapping`. Grounded in `parser_linear_base.hpp`'s terminal-match
//! routine, which every parser variant in the original reuses.

use crate::chart::{AndNode, AndNodeId, EdgeSet, NodeMapping};
use crate::eds::EdsGraph;
use crate::grammar::rule::ShrgRule;
use crate::hypergraph::{Edge, EdgeIdx};
use crate::label::{make_label_hash, LabelHash};

/// A rule instantiation in progress: some prefix of its non-terminal
/// edges (for the linear parser) or some subset of its decomposition
/// tree (for the tree parsers) has been matched. `mapping` is indexed by
/// *fragment* `NodeIdx`, not external-node position — spec §3.1's "16
/// byte vector over the current SHRG fragment's positions 0..15".
#[derive(Debug, Clone)]
pub struct PartialMatch {
    pub edge_set: EdgeSet,
    pub mapping: NodeMapping,
    /// Canonical child AND-node ids collected so far, tagged by which
    /// fragment non-terminal edge they satisfy. Tagged rather than
    /// positional because the tree parsers may bind these out of
    /// `rule.non_terminal_edges` order; `finalize` re-sorts into that
    /// canonical order before publishing an `AndNode.children`.
    pub children: Vec<(EdgeIdx, AndNodeId)>,
}

impl PartialMatch {
    pub fn empty() -> Self {
        Self {
            edge_set: EdgeSet::empty(),
            mapping: NodeMapping::unbound(),
            children: Vec::new(),
        }
    }

    /// Combines `self` with `other`, failing if their edge sets overlap
    /// or their mappings disagree on any bound position (spec §4.3's
    /// merge-step preconditions).
    pub fn combine(&self, other: &PartialMatch) -> Option<PartialMatch> {
        if !self.edge_set.is_disjoint(&other.edge_set) {
            return None;
        }
        if !self.mapping.compatible_with(&other.mapping) {
            return None;
        }
        let mut children = self.children.clone();
        children.extend(other.children.iter().copied());
        Some(PartialMatch {
            edge_set: self.edge_set.union(&other.edge_set),
            mapping: self.mapping.merged_with(&other.mapping),
            children,
        })
    }
}

/// All ways to match `rule`'s terminal edges (in their pre-indexed DFS
/// order) against `graph`'s edges: label/arity equality, at-most-one
/// use of any input edge, and a consistent fragment-node mapping (spec
/// §4.3's `Initialise`). Exhaustive backtracking — the fragments and
/// graphs this crate bounds itself to (≤32/≤256 edges) keep this
/// tractable without a smarter index.
pub fn match_terminals(rule: &ShrgRule, graph: &EdsGraph) -> Vec<PartialMatch> {
    let mut out = Vec::new();
    let mut used = EdgeSet::empty();
    let mut mapping = NodeMapping::unbound();
    backtrack(rule, graph, 0, &mut used, &mut mapping, &mut out);
    out
}

fn backtrack(
    rule: &ShrgRule,
    graph: &EdsGraph,
    idx: usize,
    used: &mut EdgeSet,
    mapping: &mut NodeMapping,
    out: &mut Vec<PartialMatch>,
) {
    if idx == rule.terminal_edges.len() {
        out.push(PartialMatch {
            edge_set: used.clone(),
            mapping: *mapping,
            children: Vec::new(),
        });
        return;
    }

    let rule_edge = rule.fragment.edge(rule.terminal_edges[idx]);
    for g_idx in 0..graph.edge_count() {
        if used.contains(g_idx) {
            continue;
        }
        let graph_edge = graph.graph.edge(EdgeIdx(g_idx as u32));
        if !graph_edge.is_terminal
            || graph_edge.label != rule_edge.label
            || graph_edge.linked_nodes.len() != rule_edge.linked_nodes.len()
        {
            continue;
        }

        let mut trial = *mapping;
        let mut ok = true;
        for (&rn, &gn) in rule_edge.linked_nodes.iter().zip(graph_edge.linked_nodes.iter()) {
            match trial.get(rn.0 as usize) {
                Some(bound) if bound != gn => {
                    ok = false;
                    break;
                }
                _ => trial.set(rn.0 as usize, gn),
            }
        }
        if !ok {
            continue;
        }

        used.insert(g_idx);
        let saved = *mapping;
        *mapping = trial;
        backtrack(rule, graph, idx + 1, used, mapping, out);
        *mapping = saved;
        used.remove(g_idx);
    }
}

/// All ways to match a single terminal `edge_idx` of `rule` against
/// `graph`'s edges, independent of any other edge. The linear parser
/// matches all terminal edges at once via `match_terminals`'s
/// backtracking; the tree parsers need one edge at a time since their
/// decomposition tree may interleave terminal and non-terminal leaves.
pub fn match_single_terminal(rule: &ShrgRule, edge_idx: EdgeIdx, graph: &EdsGraph) -> Vec<PartialMatch> {
    let rule_edge = rule.fragment.edge(edge_idx);
    let mut out = Vec::new();
    for g_idx in 0..graph.edge_count() {
        let graph_edge = graph.graph.edge(EdgeIdx(g_idx as u32));
        if !graph_edge.is_terminal
            || graph_edge.label != rule_edge.label
            || graph_edge.linked_nodes.len() != rule_edge.linked_nodes.len()
        {
            continue;
        }

        let mut mapping = NodeMapping::unbound();
        let mut ok = true;
        for (&rn, &gn) in rule_edge.linked_nodes.iter().zip(graph_edge.linked_nodes.iter()) {
            match mapping.get(rn.0 as usize) {
                Some(bound) if bound != gn => {
                    ok = false;
                    break;
                }
                _ => mapping.set(rn.0 as usize, gn),
            }
        }
        if !ok {
            continue;
        }

        out.push(PartialMatch {
            edge_set: EdgeSet::singleton(g_idx),
            mapping,
            children: Vec::new(),
        });
    }
    out
}

/// A candidate child's published `NodeMapping` is indexed by *its own*
/// external-node order; `edge.linked_nodes` gives the parent fragment's
/// node index at each of those positions (an SHRG non-terminal edge's
/// linked-node order matches the referenced rule's external-node
/// order), so re-expressing the child's mapping against the parent's
/// fragment-wide `NodeMapping` is a positional re-indexing.
pub fn project_onto_parent_fragment(edge: &Edge<()>, candidate: &AndNode) -> NodeMapping {
    let mut full = NodeMapping::unbound();
    for (pos, &parent_node) in edge.linked_nodes.iter().enumerate() {
        if let Some(bound) = candidate.node_mapping.get(pos) {
            full.set(parent_node.0 as usize, bound);
        }
    }
    full
}

/// Projects a full fragment-indexed mapping down to the rule's external
/// nodes, in `rule.external_nodes` order — the public interface stored
/// on a completed `AndNode` and used as part of its OR-node key.
pub fn project_external(rule: &ShrgRule, full: &NodeMapping) -> NodeMapping {
    let mut out = NodeMapping::unbound();
    for (pos, &node) in rule.external_nodes.iter().enumerate() {
        if let Some(bound) = full.get(node.0 as usize) {
            out.set(pos, bound);
        }
    }
    out
}

pub fn rule_label_hash(rule: &ShrgRule) -> LabelHash {
    make_label_hash(rule.label, rule.external_nodes.len(), false)
}

/// Builds one `AndNode` per `rule.cfg_rules` entry for a completed
/// `PartialMatch`, inserting each into the pool (later alternatives with
/// the same `(label_hash, edge_set, node_mapping)` key splice into the
/// same OR-node cycle, spec §4.3's `Emit passive item`). Returns the
/// distinct canonical ids produced (usually one, since all cfg_rule
/// alternatives of the same instantiation share a key).
pub fn finalize(
    rule_index: usize,
    rule: &ShrgRule,
    matched: &PartialMatch,
    pool: &mut crate::chart::Pool,
) -> crate::error::Result<Vec<AndNodeId>> {
    let label_hash = rule_label_hash(rule);
    let node_mapping = project_external(rule, &matched.mapping);
    let children = canonical_children(rule, matched);
    let mut seen = std::collections::HashSet::new();
    let mut ids = Vec::new();
    for (cfg_rule_index, cfg_rule) in rule.cfg_rules.iter().enumerate() {
        let node = AndNode {
            id: AndNodeId(0),
            rule_index,
            cfg_rule_index,
            label_hash,
            edge_set: matched.edge_set.clone(),
            node_mapping,
            children: children.clone(),
            local_score: cfg_rule.score,
            next: AndNodeId(0),
        };
        let id = pool.insert(node)?;
        if seen.insert(id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Re-orders a completed match's edge-tagged children into
/// `rule.non_terminal_edges` order, the positional convention
/// `AndNode.children` and `CfgItem::Aligned` lookups rely on.
fn canonical_children(rule: &ShrgRule, matched: &PartialMatch) -> Vec<AndNodeId> {
    rule.non_terminal_edges
        .iter()
        .map(|&edge_idx| {
            matched
                .children
                .iter()
                .find(|(e, _)| *e == edge_idx)
                .map(|(_, id)| *id)
                .expect("every non-terminal edge must have a bound child by finalize time")
        })
        .collect()
}
