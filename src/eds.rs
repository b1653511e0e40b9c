//! The input semantic graph (EDS): a bounded hypergraph whose nodes
//! carry lexical attributes consumed only by the downstream realiser.
//! Ported from `edsgraph.hpp`'s `EdsGraph`/`GraphNode`.

use crate::error::{Result, ShrgError};
use crate::hypergraph::{Hypergraph, NodeIdx};
use crate::label::{Label, LabelTable};

pub const MAX_GRAPH_EDGE_COUNT: usize = 256;
pub const MAX_GRAPH_NODE_COUNT: usize = 256;

/// Lexical attributes carried by an EDS node, consumed only by the
/// surface realiser (out of scope here; spec §1).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdsNodeAttrs {
    pub id: String,
    pub label_token: String,
    pub lemma: String,
    pub pos: String,
    pub sense: String,
    pub carg: String,
    pub properties: Vec<String>,
    pub is_lexical: bool,
}

/// One dependency graph to be parsed. `top_node` is the designated root
/// node of the EDS annotation (distinct from the SHRG parse root, which
/// is determined by edge-set coverage, spec §4.3).
#[derive(Debug, Clone)]
pub struct EdsGraph {
    pub sentence_id: String,
    pub sentence: String,
    pub lemma_sequence: String,
    pub top_node: Option<NodeIdx>,
    pub graph: Hypergraph<EdsNodeAttrs, ()>,
}

impl EdsGraph {
    pub fn new(sentence_id: String, sentence: String, lemma_sequence: String) -> Self {
        Self {
            sentence_id,
            sentence,
            lemma_sequence,
            top_node: None,
            graph: Hypergraph::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Bounds check enforced by parser initialisation (spec §3.1, §4.3).
    pub fn check_size(&self) -> Result<()> {
        if self.edge_count() > MAX_GRAPH_EDGE_COUNT || self.node_count() > MAX_GRAPH_NODE_COUNT {
            return Err(ShrgError::TooLarge {
                graph_id: Some(self.sentence_id.clone()),
                edges: self.edge_count(),
                nodes: self.node_count(),
            });
        }
        Ok(())
    }

    /// After loading, the parser augments each node with a virtual
    /// terminal edge of its own label, for uniform matching against
    /// grammar terminal edges that target node labels directly
    /// (spec §6.2).
    pub fn add_virtual_node_label_edges(&mut self, labels: &mut LabelTable) {
        let node_indices: Vec<NodeIdx> = (0..self.graph.node_count())
            .map(|i| NodeIdx(i as u32))
            .collect();
        for n in node_indices {
            let label_name = self.graph.node(n).attrs.label_token.clone();
            if label_name.is_empty() {
                continue;
            }
            let label = labels.intern(&label_name);
            self.graph.add_edge(label, true, vec![n], ());
        }
        self.graph.recompute_node_types();
    }
}

/// Parses the text graph file format of spec §6.2:
/// ```text
/// <graph_count>
/// (per graph)
/// <sentence_id>
/// <sentence>
/// <lemma_sequence>
/// <num_nodes>
/// (per node) <idx> <id> <label_token> <lemma> <pos> <sense> <carg> <prop>...
/// <top_node_idx> <num_edges>
/// (per edge) <from> <to> <label_token>
/// ```
pub fn parse_graph_file(input: &str, labels: &mut LabelTable) -> Result<Vec<EdsGraph>> {
    let mut lines = input.lines();
    let graph_count: usize = next_token(&mut lines, "graph_count")?;

    let mut graphs = Vec::with_capacity(graph_count);
    for g_idx in 0..graph_count {
        let sentence_id = next_line(&mut lines, "sentence_id")?;
        let sentence = next_line(&mut lines, "sentence")?;
        let lemma_sequence = next_line(&mut lines, "lemma_sequence")?;
        let num_nodes: usize = next_token(&mut lines, "num_nodes")?;

        let mut graph = EdsGraph::new(sentence_id, sentence, lemma_sequence);

        // allocate nodes up front so edges (which reference node idx)
        // can be wired regardless of declaration order
        let mut declared: Vec<(usize, EdsNodeAttrs)> = Vec::with_capacity(num_nodes);
        for _ in 0..num_nodes {
            let line = next_line(&mut lines, "node")?;
            let mut parts = line.split_whitespace();
            let idx: usize = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| format_err(g_idx, "node idx"))?;
            let id = parts.next().unwrap_or_default().to_string();
            let label_token = parts.next().unwrap_or_default().to_string();
            let lemma = parts.next().unwrap_or_default().to_string();
            let pos = parts.next().unwrap_or_default().to_string();
            let sense = parts.next().unwrap_or_default().to_string();
            let carg = parts.next().unwrap_or_default().to_string();
            let properties: Vec<String> = parts.map(|s| s.to_string()).collect();
            declared.push((
                idx,
                EdsNodeAttrs {
                    id,
                    label_token,
                    lemma,
                    pos,
                    sense,
                    carg,
                    properties,
                    is_lexical: true,
                },
            ));
        }
        declared.sort_by_key(|(idx, _)| *idx);
        for (_, attrs) in declared {
            graph.graph.add_node(false, attrs);
        }

        let top_and_edges = next_line(&mut lines, "top_node_idx num_edges")?;
        let mut parts = top_and_edges.split_whitespace();
        let top_idx: i64 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| format_err(g_idx, "top_node_idx"))?;
        let num_edges: usize = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| format_err(g_idx, "num_edges"))?;
        graph.top_node = if top_idx >= 0 {
            Some(NodeIdx(top_idx as u32))
        } else {
            None
        };

        for _ in 0..num_edges {
            let line = next_line(&mut lines, "edge")?;
            let mut parts = line.split_whitespace();
            let from: u32 = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| format_err(g_idx, "edge from"))?;
            let to: u32 = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| format_err(g_idx, "edge to"))?;
            let label_token = parts.next().unwrap_or_default();
            let label = labels.intern(label_token);
            // every input-graph edge is terminal data to be matched
            // against a rule's terminal edges (only rule fragments
            // distinguish terminal vs. non-terminal incidence).
            graph
                .graph
                .add_edge(label, true, vec![NodeIdx(from), NodeIdx(to)], ());
        }

        graph.graph.recompute_node_types();
        graph.add_virtual_node_label_edges(labels);
        graphs.push(graph);
    }

    Ok(graphs)
}

fn next_line<'a>(lines: &mut impl Iterator<Item = &'a str>, what: &str) -> Result<String> {
    lines
        .next()
        .map(|s| s.to_string())
        .ok_or_else(|| ShrgError::ParseFormat {
            location: "graph file".to_string(),
            reason: format!("expected {what}, hit end of input"),
        })
}

fn next_token<'a, T: std::str::FromStr>(
    lines: &mut impl Iterator<Item = &'a str>,
    what: &str,
) -> Result<T> {
    let line = next_line(lines, what)?;
    line.trim()
        .parse::<T>()
        .map_err(|_| ShrgError::ParseFormat {
            location: "graph file".to_string(),
            reason: format!("couldn't parse {what} from {line:?}"),
        })
}

fn format_err(graph_index: usize, what: &str) -> ShrgError {
    ShrgError::ParseFormat {
        location: format!("graph file, graph #{graph_index}"),
        reason: format!("couldn't parse {what}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_graph() {
        let input = "\
1
s1
The dog barks
the dog bark
2
0 n0 _dog_n_1 dog n 1 carg
1 n1 _bark_v_1 bark v 1 carg
1 1
0 1 ARG1
";
        let mut labels = LabelTable::new();
        let graphs = parse_graph_file(input, &mut labels).unwrap();
        assert_eq!(graphs.len(), 1);
        let g = &graphs[0];
        assert_eq!(g.sentence_id, "s1");
        assert_eq!(g.node_count(), 2);
        // 1 real edge + 2 virtual node-label edges
        assert_eq!(g.edge_count(), 3);
        assert_eq!(g.top_node, Some(NodeIdx(1)));
        // virtual edges key off the predicate label_token, not the bare id
        assert!(labels.lookup("_dog_n_1").is_some());
        assert!(labels.lookup("_bark_v_1").is_some());
        assert!(labels.lookup("n0").is_none());
    }

    #[test]
    fn too_large_rejected() {
        let mut g = EdsGraph::new("s".into(), "".into(), "".into());
        for _ in 0..300 {
            g.graph.add_node(false, EdsNodeAttrs::default());
        }
        assert!(g.check_size().is_err());
    }
}
