//! Inside-outside over a packed forest (spec §4.5). The topological
//! variant (`outside_topological`) is the library's normative path,
//! ported from `em.cpp::computeOutside_optimized`; the priority-queue
//! variant (`outside_priority_queue`, ported from `em.cpp::computeOutside`)
//! is kept only as a `#[cfg(test)]` cross-check per spec §9's note that
//! it is the non-normative one of the pair.

use std::collections::{HashMap, HashSet};
#[cfg(test)]
use std::{cmp::Reverse, collections::BinaryHeap};

use crate::chart::{AndNode, AndNodeId, Pool};
use crate::grammar::Grammar;
use crate::numeric::add_logs;

use super::closure::Closure;

/// Looks up an `AndNode`'s log rule weight from a dense per-`CfgRule`
/// weight vector indexed by `CfgRule.shrg_index` — the EM weight
/// vector's dimension (spec §6.3), not the `ShrgRule`'s own position.
pub fn rule_log_weight(grammar: &Grammar, node: &AndNode, weights: &[f64]) -> f64 {
    let cfg_rule = &grammar.rules[node.rule_index].cfg_rules[node.cfg_rule_index];
    weights[cfg_rule.shrg_index]
}

/// Every canonical OR-node reachable from `root` by following
/// children (which are always already-canonical ids), including every
/// cycle member of each one reached.
pub(crate) fn reachable_canonicals(pool: &Pool, root: AndNodeId) -> Vec<AndNodeId> {
    let mut order = Vec::new();
    let mut visited: HashSet<AndNodeId> = HashSet::new();
    let mut stack = vec![(root, false)];
    while let Some((canonical, expanded)) = stack.pop() {
        if expanded {
            order.push(canonical);
            continue;
        }
        if visited.contains(&canonical) {
            continue;
        }
        visited.insert(canonical);
        stack.push((canonical, true));
        for alt in pool.siblings(canonical) {
            for &child in &pool.get(alt).children {
                if !visited.contains(&child) {
                    stack.push((child, false));
                }
            }
        }
    }
    order
}

/// Inside score of every OR-node reachable from `root`, post-order
/// (children fully resolved before any node that uses them). Leaves
/// (an AND-node with no non-terminal children) contribute their bare
/// rule weight, matching spec §4.5's `β = 0` base case folded into the
/// general recurrence's empty child sum.
pub fn inside(
    grammar: &Grammar,
    pool: &Pool,
    root: AndNodeId,
    weights: &[f64],
) -> HashMap<AndNodeId, f64> {
    let order = reachable_canonicals(pool, root);
    let mut beta: HashMap<AndNodeId, f64> = HashMap::new();
    for canonical in order {
        let mut acc = f64::NEG_INFINITY;
        for alt in pool.siblings(canonical) {
            let node = pool.get(alt);
            let mut score = rule_log_weight(grammar, node, weights);
            for &child in &node.children {
                score += beta.get(&child).copied().unwrap_or(0.0);
            }
            acc = add_logs(acc, score);
        }
        beta.insert(canonical, acc);
    }
    beta
}

/// Viterbi variant of [`inside`]: `⊕` replaced by `max`, so `beta(n)`
/// is the score of the single best alternative rather than the sum
/// over all of them (spec §4.5's "best-parse relationship" sub-forest
/// Viterbi-EM trains over).
pub fn inside_viterbi(
    grammar: &Grammar,
    pool: &Pool,
    root: AndNodeId,
    weights: &[f64],
) -> HashMap<AndNodeId, f64> {
    let order = reachable_canonicals(pool, root);
    let mut beta: HashMap<AndNodeId, f64> = HashMap::new();
    for canonical in order {
        let mut best = f64::NEG_INFINITY;
        for alt in pool.siblings(canonical) {
            let node = pool.get(alt);
            let mut score = rule_log_weight(grammar, node, weights);
            for &child in &node.children {
                score += beta.get(&child).copied().unwrap_or(0.0);
            }
            if score > best {
                best = score;
            }
        }
        beta.insert(canonical, best);
    }
    beta
}

/// Outside score of every OR-node reachable from `root`, computed in
/// reverse topological order (root's ancestors/self resolved before
/// its descendants), per spec §4.5.
pub fn outside_topological(
    grammar: &Grammar,
    pool: &Pool,
    closure: &Closure,
    root: AndNodeId,
    beta: &HashMap<AndNodeId, f64>,
    weights: &[f64],
) -> HashMap<AndNodeId, f64> {
    let mut order = reachable_canonicals(pool, root);
    order.reverse(); // root (and its ancestors) before descendants
    let reachable: HashSet<AndNodeId> = order.iter().copied().collect();

    let mut alpha: HashMap<AndNodeId, f64> = HashMap::new();
    alpha.insert(root, 0.0);

    for canonical in order {
        if canonical == root && !alpha.contains_key(&root) {
            alpha.insert(root, 0.0);
        }
        let mut acc = alpha.get(&canonical).copied().unwrap_or(f64::NEG_INFINITY);
        for parent_ref in closure.parents_with_siblings(canonical) {
            let parent_node = pool.get(parent_ref.parent);
            // Skip parents outside the root's derivation space; they
            // can't contribute probability mass to this parse.
            let parent_canonical = owning_canonical(pool, parent_ref.parent);
            if !reachable.contains(&parent_canonical) {
                continue;
            }
            let parent_alpha = match alpha.get(&parent_canonical) {
                Some(&a) => a,
                None => continue,
            };
            let mut contribution = rule_log_weight(grammar, parent_node, weights) + parent_alpha;
            for &sib in &parent_ref.siblings {
                contribution += beta.get(&sib).copied().unwrap_or(0.0);
            }
            acc = add_logs(acc, contribution);
        }
        alpha.insert(canonical, acc);
    }

    alpha
}

/// The canonical id owning a (possibly non-canonical) AND-node id —
/// the lowest-index member of its `next` cycle. `AndNode.id`s that
/// appear as `parent` in a `Closure` are themselves always one
/// specific alternative's own raw id, which may or may not be its own
/// OR-node's canonical id.
fn owning_canonical(pool: &Pool, id: AndNodeId) -> AndNodeId {
    let mut min_id = id;
    let mut cur = pool.get(id).next;
    while cur != id {
        if cur < min_id {
            min_id = cur;
        }
        cur = pool.get(cur).next;
    }
    min_id
}

/// Cross-check variant: propagates outside scores in breadth-first
/// order by distance from `root`, a "priority queue by level" schedule
/// rather than a verified topological order (spec §4.5/§9). Because
/// this forest's edge sets shrink strictly from parent to child, depth
/// order is always a valid schedule here, so this is expected to agree
/// with `outside_topological` on any forest this crate builds; kept
/// behind `#[cfg(test)]` since spec §9 marks the original's PQ variant
/// as the non-normative one.
#[cfg(test)]
pub fn outside_priority_queue(
    grammar: &Grammar,
    pool: &Pool,
    closure: &Closure,
    root: AndNodeId,
    beta: &HashMap<AndNodeId, f64>,
    weights: &[f64],
) -> HashMap<AndNodeId, f64> {
    let mut depth: HashMap<AndNodeId, u32> = HashMap::new();
    depth.insert(root, 0);
    let mut heap: BinaryHeap<Reverse<(u32, u32)>> = BinaryHeap::new();
    heap.push(Reverse((0, root.0)));

    let mut alpha: HashMap<AndNodeId, f64> = HashMap::new();
    alpha.insert(root, 0.0);
    let mut visited: HashSet<AndNodeId> = HashSet::new();

    while let Some(Reverse((_, raw))) = heap.pop() {
        let canonical = AndNodeId(raw);
        if !visited.insert(canonical) {
            continue;
        }
        for alt in pool.siblings(canonical) {
            let node = pool.get(alt);
            for (pos, &child) in node.children.iter().enumerate() {
                let w = rule_log_weight(grammar, node, weights);
                let mut contribution = w + alpha.get(&canonical).copied().unwrap_or(f64::NEG_INFINITY);
                for (i, &sib) in node.children.iter().enumerate() {
                    if i != pos {
                        contribution += beta.get(&sib).copied().unwrap_or(0.0);
                    }
                }
                let acc = alpha.entry(child).or_insert(f64::NEG_INFINITY);
                *acc = add_logs(*acc, contribution);
                let d = depth.get(&canonical).copied().unwrap_or(0) + 1;
                let entry = depth.entry(child).or_insert(d);
                if d < *entry {
                    *entry = d;
                }
                if !visited.contains(&child) {
                    heap.push(Reverse((*depth.get(&child).unwrap(), child.0)));
                }
            }
        }
    }
    let _ = closure; // parents_with_siblings not needed by this child-driven push variant
    alpha
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{EdgeSet, NodeMapping, Pool};

    fn tiny_grammar_and_pool() -> (Grammar, Pool, AndNodeId) {
        // S -> A (weight log 1 = 0), A -> "a" (weight log 1 = 0).
        let grammar_text = "\
2
1
1 1
A 1 0 Y
1 0
1
0 1 1 A 1
a -1
1
2 1
A 1 0 N
1 1
1
1 1 1 S 1
_ 0
";
        let grammar = Grammar::load_from_str(grammar_text).unwrap();

        let mut pool = Pool::new(16);
        let a = AndNode {
            id: AndNodeId(0),
            rule_index: 0,
            cfg_rule_index: 0,
            label_hash: crate::label::make_label_hash(grammar.rules[0].label, 0, false),
            edge_set: EdgeSet::singleton(0),
            node_mapping: NodeMapping::unbound(),
            children: Vec::new(),
            local_score: 0.0,
            next: AndNodeId(0),
        };
        let a_id = pool.insert(a).unwrap();

        let mut s = AndNode {
            id: AndNodeId(0),
            rule_index: 1,
            cfg_rule_index: 0,
            label_hash: crate::label::make_label_hash(grammar.rules[1].label, 0, false),
            edge_set: EdgeSet::singleton(0),
            node_mapping: NodeMapping::unbound(),
            children: vec![a_id],
            local_score: 0.0,
            next: AndNodeId(0),
        };
        s.edge_set = EdgeSet::singleton(0);
        let s_id = pool.insert(s).unwrap();

        (grammar, pool, s_id)
    }

    #[test]
    fn topological_and_priority_queue_outside_agree() {
        let (grammar, pool, root) = tiny_grammar_and_pool();
        let weights = vec![0.0; grammar.cfg_rule_count()];
        let beta = inside(&grammar, &pool, root, &weights);
        assert_eq!(beta[&root], 0.0);

        let closure = Closure::build(&pool);
        let alpha_topo = outside_topological(&grammar, &pool, &closure, root, &beta, &weights);
        let alpha_pq = outside_priority_queue(&grammar, &pool, &closure, root, &beta, &weights);

        for (id, a) in &alpha_topo {
            let b = alpha_pq.get(id).copied().unwrap_or(f64::NEG_INFINITY);
            assert!((a - b).abs() < 1e-9, "outside disagreement at {:?}: {} vs {}", id, a, b);
        }
    }
}
