//! Generic labelled hypergraph: nodes with incidence lists, edges with
//! ordered (≤2) linked nodes. Ported from `hyper_graph.hpp`'s
//! `HyperGraph<NodeBase, EdgeBase>` template, realised per spec §9 as an
//! arena + index pair (the same idiom the teacher already uses for its
//! feature-structure arena in `featurestructure/node.rs`) instead of the
//! C++ original's raw pointers.

use crate::label::Label;

/// Index of a node within a `Hypergraph`'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdx(pub u32);

/// Index of an edge within a `Hypergraph`'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeIdx(pub u32);

/// Classification of a fragment/graph node by what kind of edges touch
/// it (spec §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// Only terminal edges incident.
    Fixed,
    /// Both terminal and non-terminal edges incident.
    SemiFixed,
    /// Only non-terminal edges incident.
    Free,
}

#[derive(Debug, Clone)]
pub struct Node<NB> {
    pub index: NodeIdx,
    pub is_external: bool,
    pub node_type: NodeType,
    pub linked_edges: Vec<EdgeIdx>,
    pub attrs: NB,
}

#[derive(Debug, Clone)]
pub struct Edge<EB> {
    pub index: EdgeIdx,
    pub label: Label,
    pub is_terminal: bool,
    /// Order is significant: it's the argument order of the predicate
    /// this edge represents.
    pub linked_nodes: Vec<NodeIdx>,
    pub attrs: EB,
}

impl<EB> Edge<EB> {
    pub fn label_hash(&self) -> crate::label::LabelHash {
        crate::label::make_label_hash(self.label, self.linked_nodes.len(), self.is_terminal)
    }

    /// Whether this edge shares at least one node with `other` — used
    /// by the grammar pre-index's terminal-edge DFS ordering (spec
    /// §4.1) to prefer edges that chain onto already-visited ones.
    pub fn shares_a_node(&self, other: &Edge<EB>) -> bool {
        self.linked_nodes
            .iter()
            .any(|n| other.linked_nodes.contains(n))
    }
}

/// A generic hypergraph: `NB`/`EB` are the per-node/per-edge attribute
/// payloads (e.g. lexical attributes on an EDS graph, `()` on a bare
/// SHRG rule fragment).
#[derive(Debug, Clone, Default)]
pub struct Hypergraph<NB, EB> {
    pub nodes: Vec<Node<NB>>,
    pub edges: Vec<Edge<EB>>,
}

impl<NB, EB> Hypergraph<NB, EB> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn add_node(&mut self, is_external: bool, attrs: NB) -> NodeIdx {
        let idx = NodeIdx(self.nodes.len() as u32);
        self.nodes.push(Node {
            index: idx,
            is_external,
            // Recomputed once all edges are known; Free until then.
            node_type: NodeType::Free,
            linked_edges: Vec::new(),
            attrs,
        });
        idx
    }

    pub fn add_edge(
        &mut self,
        label: Label,
        is_terminal: bool,
        linked_nodes: Vec<NodeIdx>,
        attrs: EB,
    ) -> EdgeIdx {
        let idx = EdgeIdx(self.edges.len() as u32);
        for &n in &linked_nodes {
            self.nodes[n.0 as usize].linked_edges.push(idx);
        }
        self.edges.push(Edge {
            index: idx,
            label,
            is_terminal,
            linked_nodes,
            attrs,
        });
        idx
    }

    pub fn node(&self, idx: NodeIdx) -> &Node<NB> {
        &self.nodes[idx.0 as usize]
    }

    pub fn edge(&self, idx: EdgeIdx) -> &Edge<EB> {
        &self.edges[idx.0 as usize]
    }

    /// Recompute each node's `NodeType` from its incident edges. Must be
    /// called after all edges have been added (grammar/graph loaders do
    /// this once at the end of construction).
    pub fn recompute_node_types(&mut self) {
        for node in &mut self.nodes {
            let mut has_terminal = false;
            let mut has_nonterminal = false;
            for &e in &node.linked_edges {
                if self.edges[e.0 as usize].is_terminal {
                    has_terminal = true;
                } else {
                    has_nonterminal = true;
                }
            }
            node.node_type = match (has_terminal, has_nonterminal) {
                (true, false) => NodeType::Fixed,
                (false, true) => NodeType::Free,
                _ => NodeType::SemiFixed,
            };
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// A terminal edge is a self-loop if it links the same node twice.
    /// The grammar pre-index rejects rules containing one (spec §4.1).
    pub fn edge_is_self_loop(&self, e: EdgeIdx) -> bool {
        let edge = self.edge(e);
        edge.linked_nodes.len() == 2 && edge.linked_nodes[0] == edge.linked_nodes[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::Label;

    #[test]
    fn node_types_reflect_incident_edges() {
        let mut g: Hypergraph<(), ()> = Hypergraph::new();
        let n0 = g.add_node(false, ());
        let n1 = g.add_node(false, ());
        let n2 = g.add_node(false, ());

        g.add_edge(Label(1), true, vec![n0], ());
        g.add_edge(Label(2), false, vec![n1], ());
        g.add_edge(Label(3), true, vec![n2], ());
        g.add_edge(Label(4), false, vec![n2], ());

        g.recompute_node_types();

        assert!(matches!(g.node(n0).node_type, NodeType::Fixed));
        assert!(matches!(g.node(n1).node_type, NodeType::Free));
        assert!(matches!(g.node(n2).node_type, NodeType::SemiFixed));
    }

    #[test]
    fn self_loop_detection() {
        let mut g: Hypergraph<(), ()> = Hypergraph::new();
        let n0 = g.add_node(false, ());
        let e = g.add_edge(Label(1), true, vec![n0, n0], ());
        assert!(g.edge_is_self_loop(e));
    }
}
