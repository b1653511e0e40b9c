//! The chart's AND-node arena. New nodes are deduplicated into existing
//! OR-node cycles by `(EdgeSet, NodeMapping)` signature (spec §3.2);
//! allocation above the configured capacity fails with
//! `ShrgError::OutOfMemory`, mirroring the original's fixed-size node
//! pool (`chart.hpp`'s `NodePool`).

use std::collections::HashMap;

use crate::error::{Result, ShrgError};
use crate::label::LabelHash;

use super::item::{AndNode, AndNodeId, EdgeSet, NodeMapping};

pub struct Pool {
    nodes: Vec<AndNode>,
    capacity: usize,
    /// Maps an OR-node signature to the canonical (first-created, hence
    /// lowest-index) member of its cycle.
    signatures: HashMap<(LabelHash, EdgeSet, NodeMapping), AndNodeId>,
}

impl Pool {
    pub fn new(capacity: usize) -> Self {
        Self {
            nodes: Vec::new(),
            capacity,
            signatures: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: AndNodeId) -> &AndNode {
        &self.nodes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: AndNodeId) -> &mut AndNode {
        &mut self.nodes[id.0 as usize]
    }

    /// Looks up an existing OR-node by signature without allocating.
    pub fn lookup(
        &self,
        label_hash: LabelHash,
        edge_set: &EdgeSet,
        mapping: &NodeMapping,
    ) -> Option<AndNodeId> {
        self.signatures
            .get(&(label_hash, edge_set.clone(), *mapping))
            .copied()
    }

    /// Inserts `node`, either splicing it into an existing OR-node's
    /// cycle (when its `(label_hash, edge_set, node_mapping)` signature
    /// is already present) or starting a new, single-member cycle.
    /// Returns the OR-node's canonical id either way — callers should
    /// treat the *returned* id as "this derivation's public identity",
    /// not necessarily the id of the node they passed in.
    pub fn insert(&mut self, mut node: AndNode) -> Result<AndNodeId> {
        let key = (node.label_hash, node.edge_set.clone(), node.node_mapping);
        if let Some(&canonical) = self.signatures.get(&key) {
            let id = self.alloc_raw(&mut node)?;
            let canonical_next = self.nodes[canonical.0 as usize].next;
            self.nodes[canonical.0 as usize].next = id;
            self.nodes[id.0 as usize].next = canonical_next;
            Ok(canonical)
        } else {
            let id = self.alloc_raw(&mut node)?;
            self.nodes[id.0 as usize].next = id;
            self.signatures.insert(key, id);
            Ok(id)
        }
    }

    fn alloc_raw(&mut self, node: &mut AndNode) -> Result<AndNodeId> {
        if self.nodes.len() >= self.capacity {
            return Err(ShrgError::OutOfMemory {
                capacity: self.capacity,
            });
        }
        let id = AndNodeId(self.nodes.len() as u32);
        node.id = id;
        self.nodes.push(node.clone());
        Ok(id)
    }

    /// All cycle members of the OR-node rooted at `canonical`, starting
    /// with `canonical` itself.
    pub fn siblings(&self, canonical: AndNodeId) -> Vec<AndNodeId> {
        let mut out = vec![canonical];
        let mut cur = self.nodes[canonical.0 as usize].next;
        while cur != canonical {
            out.push(cur);
            cur = self.nodes[cur.0 as usize].next;
        }
        out
    }

    pub fn iter_canonical(&self) -> impl Iterator<Item = AndNodeId> + '_ {
        self.signatures.values().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::item::NodeMapping;

    fn node(edge_set: EdgeSet, mapping: NodeMapping, rule_index: usize) -> AndNode {
        AndNode {
            id: AndNodeId(0),
            rule_index,
            cfg_rule_index: 0,
            label_hash: 7,
            edge_set,
            node_mapping: mapping,
            children: Vec::new(),
            local_score: 0.0,
            next: AndNodeId(0),
        }
    }

    #[test]
    fn second_matching_signature_joins_the_cycle() {
        let mut pool = Pool::new(16);
        let mapping = NodeMapping::unbound();
        let a = node(EdgeSet::singleton(0), mapping, 0);
        let b = node(EdgeSet::singleton(0), mapping, 1);

        let id_a = pool.insert(a).unwrap();
        let id_b = pool.insert(b).unwrap();
        assert_eq!(id_a, id_b, "same signature must return the same canonical id");

        let siblings = pool.siblings(id_a);
        assert_eq!(siblings.len(), 2);
    }

    #[test]
    fn capacity_exhaustion_is_reported() {
        let mut pool = Pool::new(1);
        let mapping = NodeMapping::unbound();
        pool.insert(node(EdgeSet::singleton(0), mapping, 0)).unwrap();
        let err = pool.insert(node(EdgeSet::singleton(1), mapping, 0));
        assert!(err.is_err());
    }
}
