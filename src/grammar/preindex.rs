//! Per-rule pre-computation done once at grammar load time (spec §4.1):
//! DFS terminal-edge ordering, ascending non-terminal-edge ordering,
//! per-prefix boundary-node masks and required-mask projections, and
//! the terminal-edge compatibility filter. Ported from
//! `synchronous_hyperedge_replacement_grammar.cpp`.

use std::collections::HashSet;

use crate::error::{Result, ShrgError};
use crate::hypergraph::{EdgeIdx, NodeIdx, NodeType};
use crate::label::LabelHash;

use super::rule::{CfgItem, ShrgRule, MAX_SHRG_EDGE_COUNT, MAX_SHRG_NODE_COUNT};

/// Bitmask over a rule fragment's (≤16) nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FragmentNodeMask(pub u16);

impl FragmentNodeMask {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn set(&mut self, idx: NodeIdx) {
        self.0 |= 1 << idx.0;
    }

    pub fn get(&self, idx: NodeIdx) -> bool {
        (self.0 >> idx.0) & 1 == 1
    }

    pub fn union(&self, other: FragmentNodeMask) -> FragmentNodeMask {
        FragmentNodeMask(self.0 | other.0)
    }
}

/// Per-rule index computed once at load time (spec §4.1).
#[derive(Debug, Clone)]
pub struct RulePreIndex {
    pub rule_index: usize,
    /// `boundary_masks[i]`: fragment nodes still on the frontier after
    /// consuming `non_terminal_edges[0..i]`. Length = non_terminal_edges.len() + 1.
    pub boundary_masks: Vec<FragmentNodeMask>,
    /// `required_masks[i]`: the fragment node positions whose binding
    /// is already fully determined after consuming
    /// `non_terminal_edges[0..i]` — used to register a partially-built
    /// active item under additional, more specific agenda keys so
    /// lookups by the next merge stay O(1) (spec §4.1).
    pub required_masks: Vec<Vec<NodeIdx>>,
    /// Hashes of this rule's terminal edges; a rule is skipped for an
    /// input graph whose terminal-edge hash set doesn't contain all of
    /// these (spec §4.1).
    pub terminal_edges_set: HashSet<LabelHash>,
}

/// Re-orders `rule`'s terminal/non-terminal edges and builds its
/// `RulePreIndex`. Fails with `MalformedGrammar` for a self-loop
/// terminal edge, an oversized fragment, or a `-inf` CFG score.
pub fn build(rule_index: usize, rule: &mut ShrgRule) -> Result<RulePreIndex> {
    if rule.fragment.edge_count() > MAX_SHRG_EDGE_COUNT
        || rule.fragment.node_count() > MAX_SHRG_NODE_COUNT
    {
        return Err(ShrgError::MalformedGrammar {
            rule_index,
            reason: format!(
                "fragment too large: {} edges (max {}), {} nodes (max {})",
                rule.fragment.edge_count(),
                MAX_SHRG_EDGE_COUNT,
                rule.fragment.node_count(),
                MAX_SHRG_NODE_COUNT
            ),
        });
    }

    for &e in &rule.terminal_edges {
        if rule.fragment.edge_is_self_loop(e) {
            return Err(ShrgError::MalformedGrammar {
                rule_index,
                reason: format!("terminal edge {:?} is a self-loop", e),
            });
        }
    }

    for cfg_rule in &rule.cfg_rules {
        if cfg_rule.label != rule.label {
            return Err(ShrgError::MalformedGrammar {
                rule_index,
                reason: "cfg_rule.label does not match rule label".to_string(),
            });
        }
        if cfg_rule.score == f64::NEG_INFINITY {
            return Err(ShrgError::MalformedGrammar {
                rule_index,
                reason: "cfg_rule.score is -inf".to_string(),
            });
        }
    }

    let mut fragment_edges: HashSet<EdgeIdx> = rule.terminal_edges.iter().copied().collect();
    fragment_edges.extend(rule.non_terminal_edges.iter().copied());
    let all_fragment_edges: HashSet<EdgeIdx> = (0..rule.fragment.edge_count())
        .map(|i| EdgeIdx(i as u32))
        .collect();
    if fragment_edges != all_fragment_edges {
        return Err(ShrgError::MalformedGrammar {
            rule_index,
            reason: "terminal+non_terminal edges don't cover the fragment".to_string(),
        });
    }

    rule.terminal_edges = dfs_order_terminal_edges(rule);
    rule.non_terminal_edges = ascending_by_free_node_count(rule);

    let boundary_masks = compute_boundary_masks(rule);
    let required_masks = compute_required_masks(rule, &boundary_masks);
    let terminal_edges_set = rule
        .terminal_edges
        .iter()
        .map(|&e| rule.fragment.edge(e).label_hash())
        .collect();

    Ok(RulePreIndex {
        rule_index,
        boundary_masks,
        required_masks,
        terminal_edges_set,
    })
}

/// Orders terminal edges by DFS from an arbitrary terminal edge so that
/// consecutive edges share at least one node whenever possible (spec
/// §4.1): improves branch pruning in the tree-decomposition parsers.
fn dfs_order_terminal_edges(rule: &ShrgRule) -> Vec<EdgeIdx> {
    let mut remaining: Vec<EdgeIdx> = rule.terminal_edges.clone();
    if remaining.is_empty() {
        return remaining;
    }
    let mut ordered = Vec::with_capacity(remaining.len());
    let mut current = remaining.remove(0);
    ordered.push(current);

    while !remaining.is_empty() {
        let current_edge = rule.fragment.edge(current);
        let next_pos = remaining
            .iter()
            .position(|&e| current_edge.shares_a_node(rule.fragment.edge(e)));
        let idx = next_pos.unwrap_or(0);
        current = remaining.remove(idx);
        ordered.push(current);
    }

    ordered
}

/// Orders non-terminal edges ascending by how many of their linked
/// fragment nodes are `Free` (only ever bound by this edge), so the
/// merge sequence binds boundary nodes as early as possible (spec §4.1).
fn ascending_by_free_node_count(rule: &ShrgRule) -> Vec<EdgeIdx> {
    let mut edges = rule.non_terminal_edges.clone();
    edges.sort_by_key(|&e| {
        rule.fragment
            .edge(e)
            .linked_nodes
            .iter()
            .filter(|&&n| matches!(rule.fragment.node(n).node_type, NodeType::Free))
            .count()
    });
    edges
}

fn compute_boundary_masks(rule: &ShrgRule) -> Vec<FragmentNodeMask> {
    let n = rule.non_terminal_edges.len();
    let mut masks = Vec::with_capacity(n + 1);

    // masks[i]: nodes that remain on the frontier (have incidence
    // outside edges[0..i]) after consuming the first i non-terminal
    // edges, restricted to external/semi-fixed nodes the rule actually
    // exposes on its interface.
    for i in 0..=n {
        let consumed: HashSet<EdgeIdx> = rule.non_terminal_edges[0..i].iter().copied().collect();
        let mut mask = FragmentNodeMask::empty();
        for node in &rule.fragment.nodes {
            let remaining_incidence = node
                .linked_edges
                .iter()
                .any(|e| !consumed.contains(e));
            if remaining_incidence || node.is_external {
                mask.set(node.index);
            }
        }
        masks.push(mask);
    }

    masks
}

/// For every prefix, the fragment node positions whose binding becomes
/// fully determined by the time that prefix has been consumed — i.e.
/// nodes that drop off the boundary mask between prefix `i` and `i+1`,
/// or that are never free again. Registering an active item under a
/// key that includes these positions lets later merges look it up by
/// bound value directly rather than scanning (spec §4.1).
fn compute_required_masks(
    rule: &ShrgRule,
    boundary_masks: &[FragmentNodeMask],
) -> Vec<Vec<NodeIdx>> {
    let mut out = Vec::with_capacity(boundary_masks.len());
    for i in 0..boundary_masks.len() {
        let mut positions = Vec::new();
        for node in &rule.fragment.nodes {
            if boundary_masks[i].get(node.index) {
                positions.push(node.index);
            }
        }
        out.push(positions);
    }
    out
}

/// Whether `input_terminal_hashes` contains every hash this rule's
/// terminal edges need — the fast compatibility filter of spec §4.1.
pub fn is_compatible(preindex: &RulePreIndex, input_terminal_hashes: &HashSet<LabelHash>) -> bool {
    preindex
        .terminal_edges_set
        .iter()
        .all(|h| input_terminal_hashes.contains(h))
}

pub fn cfg_item_is_literal(item: &CfgItem) -> bool {
    matches!(item, CfgItem::Literal(_))
}
