//! Parent/sibling back-pointers over a filled chart (spec §4.5's
//! `parents_with_siblings`), synthesised once by a reverse pass over
//! every AND-node's children rather than maintained incrementally
//! during parsing. Grounded in `em.cpp`'s `parents_sib` bookkeeping;
//! realised here as a single-pass index build rather than the
//! original's pointer back-links, per spec §9's reverse-traversal note.

use std::collections::HashMap;

use crate::chart::{AndNodeId, Pool};

/// One parent reference: the specific AND-node alternative `parent`
/// that used some OR-node as a child, plus the *other* children of
/// that alternative (its siblings) the outside recurrence needs.
#[derive(Debug, Clone)]
pub struct ParentRef {
    pub parent: AndNodeId,
    pub siblings: Vec<AndNodeId>,
}

/// Reverse index from a canonical OR-node id to every `ParentRef`
/// naming it as a child, across the whole pool. `AndNode.children`
/// entries are always already-canonical ids (every child reference is
/// populated from a value returned by `Pool::insert`/`parser::merge::finalize`,
/// which always yield the canonical id of the OR-node they complete),
/// so no extra canonicalisation step is needed while building this.
#[derive(Debug, Default)]
pub struct Closure {
    parents: HashMap<AndNodeId, Vec<ParentRef>>,
}

impl Closure {
    /// Builds the closure over every AND-node currently in `pool`, not
    /// just those reachable from a particular root — cheap relative to
    /// parsing itself, and lets the same `Closure` serve every graph's
    /// root without rebuilding.
    pub fn build(pool: &Pool) -> Closure {
        let mut parents: HashMap<AndNodeId, Vec<ParentRef>> = HashMap::new();
        for idx in 0..pool.len() {
            let id = AndNodeId(idx as u32);
            let node = pool.get(id);
            for (pos, &child) in node.children.iter().enumerate() {
                let siblings = node
                    .children
                    .iter()
                    .enumerate()
                    .filter(|&(i, _)| i != pos)
                    .map(|(_, &c)| c)
                    .collect();
                parents
                    .entry(child)
                    .or_default()
                    .push(ParentRef { parent: id, siblings });
            }
        }
        Closure { parents }
    }

    pub fn parents_with_siblings(&self, canonical: AndNodeId) -> &[ParentRef] {
        self.parents.get(&canonical).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{AndNode, EdgeSet, NodeMapping};

    fn leaf(id: u32, edge: usize) -> AndNode {
        AndNode {
            id: AndNodeId(id),
            rule_index: 0,
            cfg_rule_index: 0,
            label_hash: 1,
            edge_set: EdgeSet::singleton(edge),
            node_mapping: NodeMapping::unbound(),
            children: Vec::new(),
            local_score: 0.0,
            next: AndNodeId(id),
        }
    }

    #[test]
    fn parent_sees_its_non_terminal_children_as_siblings_of_each_other() {
        let mut pool = Pool::new(16);
        let c0 = pool.insert(leaf(0, 0)).unwrap();
        let c1 = pool.insert(leaf(1, 1)).unwrap();

        let mut parent = leaf(2, 2);
        parent.children = vec![c0, c1];
        let p = pool.insert(parent).unwrap();

        let closure = Closure::build(&pool);
        let refs = closure.parents_with_siblings(c0);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].parent, p);
        assert_eq!(refs[0].siblings, vec![c1]);
    }
}
