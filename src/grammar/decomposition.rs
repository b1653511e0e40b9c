//! Tree decomposition of a rule's fragment into a binary tree of edge
//! combinations, used by the tree/tree-index parsers (spec §4.2).
//! Ported from `parser_tree_base.hpp`'s decomposition step.

use std::collections::HashSet;

use crate::hypergraph::EdgeIdx;

use super::preindex::FragmentNodeMask;
use super::rule::ShrgRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecompositionStrategy {
    Naive,
    TerminalFirst,
    MinimumWidth,
}

/// A node of the binary decomposition tree. Leaves are fragment edges;
/// internal nodes are binary combinations, each carrying the boundary
/// (frontier) mask of the subgraph it represents.
#[derive(Debug, Clone)]
pub enum DecompNode {
    Leaf(EdgeIdx),
    Branch {
        left: Box<DecompNode>,
        right: Box<DecompNode>,
        boundary: FragmentNodeMask,
        edges: Vec<EdgeIdx>,
    },
}

impl DecompNode {
    pub fn boundary(&self) -> FragmentNodeMask {
        match self {
            DecompNode::Leaf(_) => FragmentNodeMask::empty(),
            DecompNode::Branch { boundary, .. } => *boundary,
        }
    }

    pub fn edges(&self) -> Vec<EdgeIdx> {
        match self {
            DecompNode::Leaf(e) => vec![*e],
            DecompNode::Branch { edges, .. } => edges.clone(),
        }
    }
}

/// Computes the frontier mask of a set of fragment edges: fragment
/// nodes touched by `edge_set` that either are part of the rule's
/// external interface or still have incidence outside `edge_set`.
fn frontier_mask(rule: &ShrgRule, edge_set: &HashSet<EdgeIdx>) -> FragmentNodeMask {
    let mut mask = FragmentNodeMask::empty();
    let mut touched = HashSet::new();
    for &e in edge_set {
        for &n in &rule.fragment.edge(e).linked_nodes {
            touched.insert(n);
        }
    }
    for n in touched {
        let node = rule.fragment.node(n);
        let has_outside_incidence = node.linked_edges.iter().any(|e| !edge_set.contains(e));
        if node.is_external || has_outside_incidence {
            mask.set(n);
        }
    }
    mask
}

fn branch(rule: &ShrgRule, left: DecompNode, right: DecompNode) -> DecompNode {
    let mut edges = left.edges();
    edges.extend(right.edges());
    let edge_set: HashSet<EdgeIdx> = edges.iter().copied().collect();
    let boundary = frontier_mask(rule, &edge_set);
    DecompNode::Branch {
        left: Box::new(left),
        right: Box::new(right),
        boundary,
        edges,
    }
}

/// Computes `rule`'s decomposition tree once, under the given strategy.
pub fn decompose(rule: &ShrgRule, strategy: DecompositionStrategy) -> Option<DecompNode> {
    let all_edges = rule.all_edges();
    if all_edges.is_empty() {
        return None;
    }
    if all_edges.len() == 1 {
        return Some(DecompNode::Leaf(all_edges[0]));
    }

    Some(match strategy {
        DecompositionStrategy::Naive => decompose_naive(rule),
        DecompositionStrategy::TerminalFirst => decompose_terminal_first(rule),
        DecompositionStrategy::MinimumWidth => decompose_minimum_width(rule),
    })
}

/// Left-deep combination in the rule's natural edge order (terminal
/// edges then non-terminal edges, both already ordered by the
/// pre-index).
fn decompose_naive(rule: &ShrgRule) -> DecompNode {
    let all_edges = rule.all_edges();
    let mut acc = DecompNode::Leaf(all_edges[0]);
    for &e in &all_edges[1..] {
        acc = branch(rule, acc, DecompNode::Leaf(e));
    }
    acc
}

/// Merge all terminal edges together (left-deep) before combining in
/// any non-terminal edge (also left-deep), per spec §4.2.
fn decompose_terminal_first(rule: &ShrgRule) -> DecompNode {
    let mut edges_in_order: Vec<EdgeIdx> = rule.terminal_edges.clone();
    edges_in_order.extend(rule.non_terminal_edges.iter().copied());

    let mut acc: Option<DecompNode> = None;
    for &e in &edges_in_order {
        acc = Some(match acc {
            None => DecompNode::Leaf(e),
            Some(node) => branch(rule, node, DecompNode::Leaf(e)),
        });
    }
    acc.expect("rule has at least one edge")
}

/// Greedily merges whichever pair of current components yields the
/// smallest resulting frontier mask, repeating until one tree remains.
/// This realises spec §4.2's "exhaustive DP on small fragments" as an
/// exhaustive search over all current-component pairs at each step —
/// full subset-DP over up to 32 edges is infeasible, so each step picks
/// the locally optimal merge instead of searching the whole
/// decomposition space; see DESIGN.md's Open Question notes.
fn decompose_minimum_width(rule: &ShrgRule) -> DecompNode {
    let all_edges = rule.all_edges();
    let mut components: Vec<DecompNode> = all_edges.into_iter().map(DecompNode::Leaf).collect();

    while components.len() > 1 {
        let mut best: Option<(usize, usize, u32)> = None; // (i, j, popcount)
        for i in 0..components.len() {
            for j in (i + 1)..components.len() {
                let mut edges = components[i].edges();
                edges.extend(components[j].edges());
                let edge_set: HashSet<EdgeIdx> = edges.into_iter().collect();
                let width = frontier_mask(rule, &edge_set).0.count_ones();
                if best.map(|(_, _, w)| width < w).unwrap_or(true) {
                    best = Some((i, j, width));
                }
            }
        }
        let (i, j, _) = best.expect("at least one pair when len > 1");
        let right = components.remove(j);
        let left = components.remove(i);
        components.push(branch(rule, left, right));
    }

    components.pop().expect("non-empty")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::rule::{CfgRule, ShrgRule};
    use crate::hypergraph::Hypergraph;
    use crate::label::Label;

    fn sample_rule() -> ShrgRule {
        let mut fragment: Hypergraph<(), ()> = Hypergraph::new();
        let n0 = fragment.add_node(true, ());
        let n1 = fragment.add_node(true, ());
        let n2 = fragment.add_node(false, ());
        let t0 = fragment.add_edge(Label(10), true, vec![n0], ());
        let t1 = fragment.add_edge(Label(11), true, vec![n2], ());
        let nt0 = fragment.add_edge(Label(20), false, vec![n1, n2], ());
        fragment.recompute_node_types();

        ShrgRule {
            label: Label(1),
            fragment,
            external_nodes: vec![n0, n1],
            terminal_edges: vec![t0, t1],
            non_terminal_edges: vec![nt0],
            cfg_rules: Vec::<CfgRule>::new(),
        }
    }

    #[test]
    fn naive_and_terminal_first_cover_all_edges() {
        let rule = sample_rule();
        let naive = decompose(&rule, DecompositionStrategy::Naive).unwrap();
        let tf = decompose(&rule, DecompositionStrategy::TerminalFirst).unwrap();
        let mw = decompose(&rule, DecompositionStrategy::MinimumWidth).unwrap();

        let all: HashSet<EdgeIdx> = rule.all_edges().into_iter().collect();
        for tree in [&naive, &tf, &mw] {
            let covered: HashSet<EdgeIdx> = tree.edges().into_iter().collect();
            assert_eq!(covered, all);
        }
    }
}
