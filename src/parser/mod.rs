//! Parser entry point (spec §4.3): fills a `Chart` from a grammar and an
//! input graph under one of five indexing strategies, then locates the
//! root passive item. Ported from the original's per-strategy `main()`
//! wrappers (`parser_linear.cpp`, `parser_tree_base.cpp`, ...), unified
//! here behind one `parse` function since the strategies only differ in
//! which module fills the chart.

pub mod linear;
pub mod merge;
pub mod tree;

use std::collections::HashSet;

use crate::chart::{AndNodeId, Chart};
use crate::eds::EdsGraph;
use crate::error::{Result, ShrgError};
use crate::grammar::{preindex, Grammar};

use tree::TreeVariant;

/// Which of the original's five chart-filling engines to run. All five
/// compute the same packed forest (spec §4.4's OR-node algebra is
/// strategy-independent); they trade off differently on how much of the
/// agenda work is pre-indexed by boundary (spec §4.1/§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ParserStrategy {
    Linear,
    TreeV1,
    TreeV2,
    TreeIndexV1,
    TreeIndexV2,
}

impl Default for ParserStrategy {
    fn default() -> Self {
        ParserStrategy::TreeIndexV2
    }
}

/// Parser configuration: which strategy to run, the chart's AND-node
/// pool capacity (spec §4.3's `OutOfMemory` bound), and the external
/// arity a passive item must have to be accepted as the parse root.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ParseConfig {
    pub strategy: ParserStrategy,
    pub pool_capacity: usize,
    pub root_arity: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            strategy: ParserStrategy::default(),
            pool_capacity: 1 << 20,
            root_arity: 0,
        }
    }
}

/// The result of a successful parse: the filled chart plus the root
/// passive item's canonical id.
pub struct ParseOutcome {
    pub chart: Chart,
    pub root: AndNodeId,
}

/// Parses `graph` against `grammar`, returning `ShrgError::TooLarge` if
/// the graph exceeds spec §6.2's size bound (checked by the caller via
/// `EdsGraph::check_size` before this is reached in normal use) and
/// `ShrgError::NoResult` if the chart fills without ever producing a
/// full-coverage item of the requested root arity (spec §4.3).
pub fn parse(grammar: &Grammar, graph: &EdsGraph, config: &ParseConfig) -> Result<ParseOutcome> {
    let input_hashes: HashSet<_> = (0..graph.edge_count())
        .map(|i| {
            graph
                .graph
                .edge(crate::hypergraph::EdgeIdx(i as u32))
                .label_hash()
        })
        .collect();

    let compatible_rules: Vec<usize> = (0..grammar.rule_count())
        .filter(|&i| preindex::is_compatible(&grammar.preindex[i], &input_hashes))
        .collect();

    let mut chart = Chart::new(config.pool_capacity);

    match config.strategy {
        ParserStrategy::Linear => {
            linear::run(grammar, graph, &compatible_rules, &mut chart)?;
        }
        ParserStrategy::TreeV1 => {
            tree::run(grammar, graph, &compatible_rules, TreeVariant::V1, &mut chart)?;
        }
        ParserStrategy::TreeV2 => {
            tree::run(grammar, graph, &compatible_rules, TreeVariant::V2, &mut chart)?;
        }
        ParserStrategy::TreeIndexV1 => {
            tree::run(grammar, graph, &compatible_rules, TreeVariant::IndexV1, &mut chart)?;
        }
        ParserStrategy::TreeIndexV2 => {
            tree::run(grammar, graph, &compatible_rules, TreeVariant::IndexV2, &mut chart)?;
        }
    }

    let total_edges = graph.edge_count();
    let root = find_root(&chart, total_edges, config.root_arity).ok_or_else(|| ShrgError::NoResult {
        graph_id: Some(graph.sentence_id.clone()),
    })?;

    Ok(ParseOutcome { chart, root })
}

/// Scans the chart's canonical passive items for one covering every
/// input edge with the requested external arity (spec §4.3's root
/// acceptance condition).
fn find_root(chart: &Chart, total_edges: usize, root_arity: usize) -> Option<AndNodeId> {
    chart.pool.iter_canonical().find(|&id| {
        let node = chart.pool.get(id);
        if !node.edge_set.is_full_coverage(total_edges) {
            return false;
        }
        (0..16).filter(|&p| node.node_mapping.get(p).is_some()).count() == root_arity
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Grammar;

    #[test]
    fn parses_single_terminal_rule_and_finds_root() {
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

        let config = ParseConfig {
            strategy: ParserStrategy::Linear,
            root_arity: 1,
            ..ParseConfig::default()
        };
        let outcome = parse(&grammar, graph, &config).unwrap();
        assert!(outcome.chart.pool.len() > 0);
    }

    #[test]
    fn empty_grammar_against_nonempty_graph_yields_no_result() {
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
b
b
1
0 n0 B b b b b
0 0
";
        let mut labels = grammar.labels.clone();
        let graphs = crate::eds::parse_graph_file(graph_text, &mut labels).unwrap();
        let graph = &graphs[0];

        let config = ParseConfig::default();
        let err = parse(&grammar, graph, &config).unwrap_err();
        assert!(matches!(err, ShrgError::NoResult { .. }));
    }
}
