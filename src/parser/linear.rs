//! The flat "linear" indexing strategy (spec §4.3): every compatible
//! rule's non-terminal edges are consumed strictly in their pre-indexed
//! order, one agenda key per `(rule, prefix, bound-positions)`. Ported
//! from `parser_linear.hpp/.cpp`; the primary, fully-worked-out engine
//! the tree parsers' shared merge core (`parser::merge`) was factored
//! out of.

use std::collections::VecDeque;

use crate::chart::{AndNodeId, Chart, LabelKey};
use crate::eds::EdsGraph;
use crate::error::Result;
use crate::grammar::Grammar;
use crate::label::make_label_hash;

use super::merge::{finalize, match_terminals, project_onto_parent_fragment, PartialMatch};

/// An active item: `rule_index` has matched `matched.edge_set` so far
/// and is waiting on `rule.non_terminal_edges[prefix]` next.
struct ActiveItem {
    rule_index: usize,
    prefix: usize,
    matched: PartialMatch,
}

/// Runs the linear parser over `compatible_rules`, filling `chart` with
/// every passive item derivable from `graph`. Active items waiting on a
/// non-terminal edge are kept in a flat `waiting` list and rescanned
/// whenever a new passive item of a matching label is filed — the
/// `RulePreIndex::required_masks` spec §4.1 computes per prefix exist to
/// let a real deployment bucket this list by bound value instead of
/// scanning it; this engine keeps the simpler flat scan since
/// `PartialMatch::combine` already rejects incompatible mappings and
/// the chart sizes this crate targets don't need the extra index.
pub fn run(
    grammar: &Grammar,
    graph: &EdsGraph,
    compatible_rules: &[usize],
    chart: &mut Chart,
) -> Result<()> {
    let mut active: Vec<ActiveItem> = Vec::new();
    let mut waiting: Vec<usize> = Vec::new();
    let mut queue: VecDeque<Work> = VecDeque::new();

    for &rule_index in compatible_rules {
        let rule = &grammar.rules[rule_index];
        for matched in match_terminals(rule, graph) {
            let item = ActiveItem {
                rule_index,
                prefix: 0,
                matched,
            };
            queue.push_back(Work::Active(active.len()));
            active.push(item);
        }
    }

    while let Some(work) = queue.pop_front() {
        match work {
            Work::Active(idx) => {
                let rule_index = active[idx].rule_index;
                let prefix = active[idx].prefix;
                let rule = &grammar.rules[rule_index];

                if prefix == rule.non_terminal_edges.len() {
                    let matched = active[idx].matched.clone();
                    for id in finalize(rule_index, rule, &matched, &mut chart.pool)? {
                        file_completed(chart, rule, id, &mut queue);
                    }
                    continue;
                }

                let next_edge = rule.fragment.edge(rule.non_terminal_edges[prefix]);
                let label_hash =
                    make_label_hash(next_edge.label, next_edge.linked_nodes.len(), false);

                let candidates: Vec<AndNodeId> =
                    chart.agenda.completed(&LabelKey(label_hash)).to_vec();
                for candidate in candidates {
                    try_merge(grammar, chart, &mut active, &mut queue, idx, candidate);
                }

                waiting.push(idx);
            }
            Work::Completed(id) => {
                // Re-scan every active item waiting on this id's label,
                // since it was just filed (this mirrors Agenda's FIFO
                // label-keyed `updated_agendas` sweep, spec §4.3).
                let label_hash = chart.pool.get(id).label_hash;
                for &active_idx in &waiting {
                    let a_rule = &grammar.rules[active[active_idx].rule_index];
                    let prefix = active[active_idx].prefix;
                    if prefix >= a_rule.non_terminal_edges.len() {
                        continue;
                    }
                    let next_edge = a_rule.fragment.edge(a_rule.non_terminal_edges[prefix]);
                    let want = make_label_hash(next_edge.label, next_edge.linked_nodes.len(), false);
                    if want == label_hash {
                        try_merge(grammar, chart, &mut active, &mut queue, active_idx, id);
                    }
                }
            }
        }
    }

    Ok(())
}

enum Work {
    Active(usize),
    Completed(AndNodeId),
}

fn file_completed(
    chart: &mut Chart,
    rule: &crate::grammar::rule::ShrgRule,
    id: AndNodeId,
    queue: &mut VecDeque<Work>,
) {
    let label_hash = make_label_hash(rule.label, rule.external_nodes.len(), false);
    chart.agenda.file_completed(LabelKey(label_hash), id);
    queue.push_back(Work::Completed(id));
}

fn try_merge(
    grammar: &Grammar,
    chart: &mut Chart,
    active: &mut Vec<ActiveItem>,
    queue: &mut VecDeque<Work>,
    active_idx: usize,
    candidate: AndNodeId,
) {
    let (rule_index, prefix) = (active[active_idx].rule_index, active[active_idx].prefix);
    let rule = &grammar.rules[rule_index];
    if prefix >= rule.non_terminal_edges.len() {
        return;
    }
    let edge = rule.fragment.edge(rule.non_terminal_edges[prefix]);

    let edge_idx = rule.non_terminal_edges[prefix];
    let candidate_match = {
        let node = chart.pool.get(candidate);
        PartialMatch {
            edge_set: node.edge_set.clone(),
            mapping: project_onto_parent_fragment(edge, node),
            children: vec![(edge_idx, candidate)],
        }
    };

    let combined = match active[active_idx].matched.combine(&candidate_match) {
        Some(c) => c,
        None => return,
    };

    let new_item = ActiveItem {
        rule_index,
        prefix: prefix + 1,
        matched: combined,
    };
    let new_idx = active.len();
    active.push(new_item);
    queue.push_back(Work::Active(new_idx));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Grammar;

    #[test]
    fn single_terminal_rule_parses() {
        // spec §8 scenario 1: one rule, one terminal edge A/1, graph with
        // one node + one terminal edge A/1.
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

        let input_hashes: std::collections::HashSet<_> = (0..graph.edge_count())
            .map(|i| graph.graph.edge(crate::hypergraph::EdgeIdx(i as u32)).label_hash())
            .collect();
        let compatible: Vec<usize> = (0..grammar.rule_count())
            .filter(|&i| crate::grammar::preindex::is_compatible(&grammar.preindex[i], &input_hashes))
            .collect();

        let mut chart = Chart::new(1024);
        run(&grammar, graph, &compatible, &mut chart).unwrap();

        let total_edges = graph.edge_count();
        let found = chart
            .pool
            .iter_canonical()
            .any(|id| chart.pool.get(id).edge_set.is_full_coverage(total_edges));
        assert!(found, "expected at least one root-covering passive item");
    }
}
