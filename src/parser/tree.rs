//! The tree and tree-index indexing strategies (spec §4.3): rather than
//! consuming a rule's non-terminal edges strictly left-to-right, these
//! combine a rule's fragment via its binary decomposition tree
//! (`grammar::decomposition`), which can shrink a partial match's
//! boundary at internal nodes instead of growing it monotonically like
//! the linear strategy's prefix does. Ported from `parser_tree_base.hpp`
//! / `parser_tree_index_v1.hpp`, generalised into one evaluator
//! parameterised by `TreeVariant` since all four tree-based original
//! engines share the same merge semantics and differ only in which
//! decomposition strategy feeds them (spec §4.2) — see DESIGN.md for
//! the tradeoff this folds away (per-key agenda indexing performance,
//! not one of spec.md's testable properties).

use std::collections::HashSet;

use crate::chart::{AndNodeId, Chart, LabelKey};
use crate::eds::EdsGraph;
use crate::error::Result;
use crate::grammar::decomposition::{decompose, DecompNode, DecompositionStrategy};
use crate::grammar::rule::ShrgRule;
use crate::grammar::Grammar;
use crate::label::make_label_hash;

use super::merge::{
    finalize, match_single_terminal, project_onto_parent_fragment, rule_label_hash, PartialMatch,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeVariant {
    V1,
    V2,
    IndexV1,
    IndexV2,
}

impl TreeVariant {
    fn strategy(self) -> DecompositionStrategy {
        match self {
            TreeVariant::V1 => DecompositionStrategy::Naive,
            TreeVariant::V2 => DecompositionStrategy::TerminalFirst,
            TreeVariant::IndexV1 | TreeVariant::IndexV2 => DecompositionStrategy::MinimumWidth,
        }
    }
}

/// Runs a tree-based strategy to a fixpoint: each round re-evaluates
/// every compatible rule's decomposition tree against the chart's
/// current contents and files any newly-discovered completed items;
/// repeats until a round adds nothing new. Bounded fragment/graph sizes
/// (spec §3.1/§6.2) keep full-tree re-evaluation per round affordable.
pub fn run(
    grammar: &Grammar,
    graph: &EdsGraph,
    compatible_rules: &[usize],
    variant: TreeVariant,
    chart: &mut Chart,
) -> Result<()> {
    let strategy = variant.strategy();
    let mut filed: HashSet<AndNodeId> = HashSet::new();

    loop {
        let mut changed = false;
        for &rule_index in compatible_rules {
            let rule = &grammar.rules[rule_index];
            let tree = match decompose(rule, strategy) {
                Some(t) => t,
                None => continue,
            };
            let matches = evaluate(&tree, rule, graph, chart);
            for matched in &matches {
                for id in finalize(rule_index, rule, matched, &mut chart.pool)? {
                    if filed.insert(id) {
                        let label_hash = rule_label_hash(rule);
                        chart.agenda.file_completed(LabelKey(label_hash), id);
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }

    Ok(())
}

/// Evaluates a decomposition subtree into every `PartialMatch` it can
/// currently produce. Leaves covering a terminal edge are matched
/// directly against `graph`; leaves covering a non-terminal edge draw
/// from whatever passive items the chart currently has filed for that
/// edge's label. Branch nodes are the cross product of their children's
/// matches, filtered through `PartialMatch::combine`'s join condition.
fn evaluate(node: &DecompNode, rule: &ShrgRule, graph: &EdsGraph, chart: &Chart) -> Vec<PartialMatch> {
    match node {
        DecompNode::Leaf(edge_idx) => {
            let edge = rule.fragment.edge(*edge_idx);
            if edge.is_terminal {
                match_single_terminal(rule, *edge_idx, graph)
            } else {
                let label_hash = make_label_hash(edge.label, edge.linked_nodes.len(), false);
                chart
                    .agenda
                    .completed(&LabelKey(label_hash))
                    .iter()
                    .map(|&candidate| {
                        let cand_node = chart.pool.get(candidate);
                        PartialMatch {
                            edge_set: cand_node.edge_set.clone(),
                            mapping: project_onto_parent_fragment(edge, cand_node),
                            children: vec![(*edge_idx, candidate)],
                        }
                    })
                    .collect()
            }
        }
        DecompNode::Branch { left, right, .. } => {
            let lefts = evaluate(left, rule, graph, chart);
            let rights = evaluate(right, rule, graph, chart);
            let mut out = Vec::with_capacity(lefts.len() * rights.len());
            for l in &lefts {
                for r in &rights {
                    if let Some(combined) = l.combine(r) {
                        out.push(combined);
                    }
                }
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::Chart;
    use crate::grammar::Grammar;

    #[test]
    fn index_v1_parses_the_same_single_terminal_rule_as_linear() {
        // Same grammar/graph as linear.rs's `single_terminal_rule_parses`
        // — a tree strategy should find the same root-covering item.
        let grammar_text = "\
1
1
1 1
A 1 0 Y
1 0
1
0 1 1 S 1
a -1
";
        let grammar = Grammar::load_from_str(grammar_text).unwrap();

        let graph_text = "\
1
s1
a
a
1
0 n0 A a a a a
0 0
";
        let mut labels = grammar.labels.clone();
        let graphs = crate::eds::parse_graph_file(graph_text, &mut labels).unwrap();
        let graph = &graphs[0];

        let input_hashes: HashSet<_> = (0..graph.edge_count())
            .map(|i| graph.graph.edge(crate::hypergraph::EdgeIdx(i as u32)).label_hash())
            .collect();
        let compatible: Vec<usize> = (0..grammar.rule_count())
            .filter(|&i| crate::grammar::preindex::is_compatible(&grammar.preindex[i], &input_hashes))
            .collect();

        let mut chart = Chart::new(1024);
        run(&grammar, graph, &compatible, TreeVariant::IndexV1, &mut chart).unwrap();

        let total_edges = graph.edge_count();
        let found = chart
            .pool
            .iter_canonical()
            .any(|id| chart.pool.get(id).edge_set.is_full_coverage(total_edges));
        assert!(found, "expected at least one root-covering passive item");
    }
}
