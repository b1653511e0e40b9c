//! Derivation extraction (spec §4.7): six scoring policies over an
//! OR-node forest, each memoised per canonical node, plus gold-derivation
//! alignment by multiset backtracking. Ported from
//! `get_deriv_rule_indices.cpp`/`get_derivation_edges.cpp`'s per-policy
//! best-derivation walks and `em_framework/find_derivations.cpp`'s
//! sampling variants.

use std::collections::HashMap;

use rand::Rng;

use crate::chart::{AndNodeId, Pool};
use crate::error::{Result, ShrgError};
use crate::grammar::Grammar;

use super::inside_outside::rule_log_weight;

/// One resolved node of an extracted derivation tree (spec §3.1's
/// "finite labelled tree"; built only during extraction).
#[derive(Debug, Clone)]
pub struct Derivation {
    pub and_node: AndNodeId,
    pub rule_index: usize,
    pub cfg_rule_index: usize,
    pub children: Vec<Derivation>,
}

impl Derivation {
    /// Rule indices (`CfgRule::shrg_index`) of every node, pre-order —
    /// the "multiset of rule indices" gold alignment consumes and the
    /// value spec §6.4's `Rule_Indices` line reports.
    pub fn rule_indices(&self, grammar: &Grammar) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_rule_indices(grammar, &mut out);
        out
    }

    fn collect_rule_indices(&self, grammar: &Grammar, out: &mut Vec<usize>) {
        let cfg_rule = &grammar.rules[self.rule_index].cfg_rules[self.cfg_rule_index];
        out.push(cfg_rule.shrg_index);
        for child in &self.children {
            child.collect_rule_indices(grammar, out);
        }
    }
}

/// The six extraction strategies of spec §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPolicy {
    /// Maximum `log w(rule)` at each OR-node.
    EmGreedy,
    /// Maximum inside score `beta` at each OR-node.
    EmInside,
    /// Maximum stored `score` (log weight + children's scores).
    CountGreedy,
    /// Maximum `log_inside_count` (log derivation count).
    CountInside,
    /// Multinomial sample weighted by rule weight.
    Sample,
    /// Uniform sample over alternatives.
    Uniform,
}

/// Per-node scores the policies that aren't a direct forest quantity
/// (`count-greedy`, `count-inside`) need precomputed; `em-greedy`/
/// `em-inside` read straight from `weights`/`beta`.
pub struct ExtractionContext<'a> {
    pub grammar: &'a Grammar,
    pub pool: &'a Pool,
    pub weights: &'a [f64],
    /// `beta(n)` per canonical node, from `inside_outside::inside`.
    pub beta: Option<&'a HashMap<AndNodeId, f64>>,
    /// `log_derivation_count(n)` per canonical node, from
    /// `forest::analytics::log_derivation_count`'s memo table, if the
    /// caller wants `count-inside` extraction.
    pub log_inside_count: Option<&'a HashMap<AndNodeId, f64>>,
}

/// Extracts one derivation rooted at `root` under `policy`, memoising
/// the winning alternative per canonical node so repeated extraction
/// (spec §8's "`em-greedy` applied twice yields the same derivation")
/// is both deterministic and cheap.
pub fn extract(ctx: &ExtractionContext, root: AndNodeId, policy: ExtractionPolicy) -> Derivation {
    let mut memo: HashMap<AndNodeId, AndNodeId> = HashMap::new();
    let mut rng = rand::thread_rng();
    build(ctx, root, policy, &mut memo, &mut rng)
}

/// Like [`extract`] but with an explicit RNG, so `sample`/`uniform` are
/// reproducible under a fixed seed (spec §8's "`sample(forest)` with
/// fixed seed is reproducible").
pub fn extract_with_rng(
    ctx: &ExtractionContext,
    root: AndNodeId,
    policy: ExtractionPolicy,
    rng: &mut impl Rng,
) -> Derivation {
    let mut memo: HashMap<AndNodeId, AndNodeId> = HashMap::new();
    build(ctx, root, policy, &mut memo, rng)
}

fn build(
    ctx: &ExtractionContext,
    canonical: AndNodeId,
    policy: ExtractionPolicy,
    memo: &mut HashMap<AndNodeId, AndNodeId>,
    rng: &mut impl Rng,
) -> Derivation {
    let chosen = *memo
        .entry(canonical)
        .or_insert_with(|| choose_alternative(ctx, canonical, policy, rng));

    let node = ctx.pool.get(chosen);
    let children = node
        .children
        .clone()
        .into_iter()
        .map(|child| build(ctx, child, policy, memo, rng))
        .collect();

    Derivation {
        and_node: chosen,
        rule_index: node.rule_index,
        cfg_rule_index: node.cfg_rule_index,
        children,
    }
}

fn choose_alternative(
    ctx: &ExtractionContext,
    canonical: AndNodeId,
    policy: ExtractionPolicy,
    rng: &mut impl Rng,
) -> AndNodeId {
    let alts = ctx.pool.siblings(canonical);
    debug_assert!(!alts.is_empty());

    match policy {
        ExtractionPolicy::EmGreedy => *alts
            .iter()
            .max_by(|&&a, &&b| {
                let wa = rule_log_weight(ctx.grammar, ctx.pool.get(a), ctx.weights);
                let wb = rule_log_weight(ctx.grammar, ctx.pool.get(b), ctx.weights);
                wa.partial_cmp(&wb).unwrap()
            })
            .unwrap(),
        ExtractionPolicy::EmInside => {
            let beta = ctx.beta.expect("em-inside extraction requires inside scores");
            *alts
                .iter()
                .max_by(|&&a, &&b| alt_inside(ctx, beta, a).partial_cmp(&alt_inside(ctx, beta, b)).unwrap())
                .unwrap()
        }
        ExtractionPolicy::CountGreedy => *alts
            .iter()
            .max_by(|&&a, &&b| alt_score(ctx, a).partial_cmp(&alt_score(ctx, b)).unwrap())
            .unwrap(),
        ExtractionPolicy::CountInside => {
            let counts = ctx
                .log_inside_count
                .expect("count-inside extraction requires log_derivation_count");
            *alts
                .iter()
                .max_by(|&&a, &&b| {
                    alt_log_derivation_count(ctx, counts, a)
                        .partial_cmp(&alt_log_derivation_count(ctx, counts, b))
                        .unwrap()
                })
                .unwrap()
        }
        ExtractionPolicy::Sample => {
            let log_weights: Vec<f64> = alts
                .iter()
                .map(|&a| rule_log_weight(ctx.grammar, ctx.pool.get(a), ctx.weights))
                .collect();
            sample_by_log_weight(&alts, &log_weights, rng)
        }
        ExtractionPolicy::Uniform => alts[rng.gen_range(0..alts.len())],
    }
}

fn alt_inside(ctx: &ExtractionContext, beta: &HashMap<AndNodeId, f64>, alt: AndNodeId) -> f64 {
    let node = ctx.pool.get(alt);
    let mut score = rule_log_weight(ctx.grammar, node, ctx.weights);
    for &child in &node.children {
        score += beta.get(&child).copied().unwrap_or(0.0);
    }
    score
}

/// `count-inside`'s per-alternative share of its OR-node's
/// `log_derivation_count`: the sum of its *children's* canonical log
/// counts (a leaf, with no children, contributes `log 1 = 0`). `counts`
/// is keyed by canonical id (spec §4.6), so the alternative itself —
/// which may not be its own OR-node's canonical — is never looked up
/// directly; only its children are, and every child reference is
/// already canonical (spec §3.2).
fn alt_log_derivation_count(ctx: &ExtractionContext, counts: &HashMap<AndNodeId, f64>, alt: AndNodeId) -> f64 {
    let node = ctx.pool.get(alt);
    node.children
        .iter()
        .map(|child| counts.get(child).copied().unwrap_or(0.0))
        .sum()
}

/// `count-greedy`'s stored `score`: this alternative's own log weight
/// plus the sum of its children's own best `count-greedy` scores,
/// recursively. Memoised across the call so repeated extraction stays
/// linear in forest size.
fn alt_score(ctx: &ExtractionContext, alt: AndNodeId) -> f64 {
    fn go(ctx: &ExtractionContext, canonical: AndNodeId, memo: &mut HashMap<AndNodeId, f64>) -> f64 {
        if let Some(&s) = memo.get(&canonical) {
            return s;
        }
        let best = ctx
            .pool
            .siblings(canonical)
            .into_iter()
            .map(|alt| {
                let node = ctx.pool.get(alt);
                let mut s = rule_log_weight(ctx.grammar, node, ctx.weights);
                for &child in &node.children {
                    s += go(ctx, child, memo);
                }
                s
            })
            .fold(f64::NEG_INFINITY, f64::max);
        memo.insert(canonical, best);
        best
    }
    let mut memo = HashMap::new();
    let node = ctx.pool.get(alt);
    let mut s = rule_log_weight(ctx.grammar, node, ctx.weights);
    for &child in &node.children {
        s += go(ctx, child, &mut memo);
    }
    s
}

fn sample_by_log_weight(alts: &[AndNodeId], log_weights: &[f64], rng: &mut impl Rng) -> AndNodeId {
    let max_w = log_weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let unnormalized: Vec<f64> = log_weights.iter().map(|&w| (w - max_w).exp()).collect();
    let total: f64 = unnormalized.iter().sum();
    let mut target = rng.gen::<f64>() * total;
    for (i, &w) in unnormalized.iter().enumerate() {
        if target < w {
            return alts[i];
        }
        target -= w;
    }
    *alts.last().unwrap()
}

/// Aligns a multiset of gold `CfgRule::shrg_index` values against the
/// forest rooted at `root`: depth-first, consuming one matching rule
/// index from the multiset at each AND-node, backtracking on mismatch
/// or exhaustion (spec §4.7's "Gold derivation alignment"). Returns
/// `ShrgError::NotRepresentable` if no alternative sequence of choices
/// can consume the whole multiset.
pub fn align_gold(
    grammar: &Grammar,
    pool: &Pool,
    root: AndNodeId,
    gold_rule_indices: &[usize],
    graph_id: Option<String>,
) -> Result<Derivation> {
    let mut remaining: HashMap<usize, usize> = HashMap::new();
    for &idx in gold_rule_indices {
        *remaining.entry(idx).or_insert(0) += 1;
    }
    align_node(grammar, pool, root, &mut remaining)
        .ok_or(ShrgError::NotRepresentable { graph_id })
}

fn align_node(
    grammar: &Grammar,
    pool: &Pool,
    canonical: AndNodeId,
    remaining: &mut HashMap<usize, usize>,
) -> Option<Derivation> {
    for alt in pool.siblings(canonical) {
        let node = pool.get(alt);
        let cfg_rule = &grammar.rules[node.rule_index].cfg_rules[node.cfg_rule_index];
        let shrg_index = cfg_rule.shrg_index;

        let available = remaining.get(&shrg_index).copied().unwrap_or(0);
        if available == 0 {
            continue;
        }
        *remaining.get_mut(&shrg_index).unwrap() -= 1;

        let mut children = Vec::with_capacity(node.children.len());
        let mut ok = true;
        for &child in &node.children {
            match align_node(grammar, pool, child, remaining) {
                Some(d) => children.push(d),
                None => {
                    ok = false;
                    break;
                }
            }
        }

        if ok {
            return Some(Derivation {
                and_node: alt,
                rule_index: node.rule_index,
                cfg_rule_index: node.cfg_rule_index,
                children,
            });
        }

        // backtrack: undo every child consumption and this node's own.
        restore(grammar, &children, remaining);
        *remaining.get_mut(&shrg_index).unwrap() += 1;
    }
    None
}

/// Restores the gold multiset by re-inserting every rule index consumed
/// while building a (now-discarded) partial `children` list, mirroring
/// spec §4.7's "backtrack restoring the multiset exactly".
fn restore(grammar: &Grammar, children: &[Derivation], remaining: &mut HashMap<usize, usize>) {
    for child in children {
        restore_one(grammar, child, remaining);
    }
}

fn restore_one(grammar: &Grammar, derivation: &Derivation, remaining: &mut HashMap<usize, usize>) {
    let cfg_rule = &grammar.rules[derivation.rule_index].cfg_rules[derivation.cfg_rule_index];
    *remaining.entry(cfg_rule.shrg_index).or_insert(0) += 1;
    for child in &derivation.children {
        restore_one(grammar, child, remaining);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{AndNode, EdgeSet, NodeMapping, Pool};
    use crate::grammar::Grammar;

    fn single_terminal_grammar_and_pool() -> (Grammar, Pool, AndNodeId) {
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
        let mut pool = Pool::new(16);
        let leaf = AndNode {
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
        let root = pool.insert(leaf).unwrap();
        (grammar, pool, root)
    }

    #[test]
    fn em_greedy_is_deterministic_across_repeated_calls() {
        let (grammar, pool, root) = single_terminal_grammar_and_pool();
        let weights = vec![0.0; grammar.cfg_rule_count()];
        let ctx = ExtractionContext {
            grammar: &grammar,
            pool: &pool,
            weights: &weights,
            beta: None,
            log_inside_count: None,
        };
        let d1 = extract(&ctx, root, ExtractionPolicy::EmGreedy);
        let d2 = extract(&ctx, root, ExtractionPolicy::EmGreedy);
        assert_eq!(d1.rule_indices(&grammar), d2.rule_indices(&grammar));
    }

    #[test]
    fn gold_alignment_round_trips_em_greedy_output() {
        let (grammar, pool, root) = single_terminal_grammar_and_pool();
        let weights = vec![0.0; grammar.cfg_rule_count()];
        let ctx = ExtractionContext {
            grammar: &grammar,
            pool: &pool,
            weights: &weights,
            beta: None,
            log_inside_count: None,
        };
        let extracted = extract(&ctx, root, ExtractionPolicy::EmGreedy);
        let rule_indices = extracted.rule_indices(&grammar);

        let aligned = align_gold(&grammar, &pool, root, &rule_indices, None).unwrap();
        assert_eq!(aligned.rule_indices(&grammar), rule_indices);
    }

    #[test]
    fn gold_alignment_rejects_unrepresentable_multiset() {
        let (grammar, pool, root) = single_terminal_grammar_and_pool();
        let err = align_gold(&grammar, &pool, root, &[9999], None).unwrap_err();
        assert!(matches!(err, ShrgError::NotRepresentable { .. }));
    }

    /// Three-rule grammar packing two `S` alternatives into one OR-node:
    /// `alt1` (no children) with the higher own rule weight, `alt2`
    /// (one leaf child whose own weight dwarfs both) with the lower own
    /// weight. `em-greedy` only ever looks at own weight, so it must
    /// prefer `alt1`; `em-inside` folds in the child's beta, so it must
    /// prefer `alt2` once that child's weight is large enough to flip
    /// the ordering.
    fn diverging_em_greedy_and_em_inside_grammar_and_pool() -> (Grammar, Pool, AndNodeId, AndNodeId) {
        let grammar_text = "\
3
1
1 1
L 1 0 Y
1 0
1
0 1 1 Leaf 1
l -1
1
1 1
A1 1 0 Y
1 0
1
1 1 1 S 1
x -1
1
1 1
A2 1 0 Y
1 0
1
2 1 1 S 1
y -1
";
        let grammar = Grammar::load_from_str(grammar_text).unwrap();
        let mut pool = Pool::new(16);

        let leaf = AndNode {
            id: AndNodeId(0),
            rule_index: 0,
            cfg_rule_index: 0,
            label_hash: crate::label::make_label_hash(grammar.rules[0].label, 0, false),
            edge_set: EdgeSet::singleton(1),
            node_mapping: NodeMapping::unbound(),
            children: Vec::new(),
            local_score: 0.0,
            next: AndNodeId(0),
        };
        let leaf_id = pool.insert(leaf).unwrap();

        let s_label_hash = crate::label::make_label_hash(grammar.rules[1].label, 0, false);
        let alt1 = AndNode {
            id: AndNodeId(0),
            rule_index: 1,
            cfg_rule_index: 0,
            label_hash: s_label_hash,
            edge_set: EdgeSet::singleton(0),
            node_mapping: NodeMapping::unbound(),
            children: Vec::new(),
            local_score: 0.0,
            next: AndNodeId(0),
        };
        let root = pool.insert(alt1).unwrap();

        let alt2 = AndNode {
            id: AndNodeId(0),
            rule_index: 2,
            cfg_rule_index: 0,
            label_hash: s_label_hash,
            edge_set: EdgeSet::singleton(0),
            node_mapping: NodeMapping::unbound(),
            children: vec![leaf_id],
            local_score: 0.0,
            next: AndNodeId(0),
        };
        let alt2_id = pool.insert(alt2).unwrap();
        assert_eq!(alt2_id, root, "alt2 must join alt1's OR-node rather than start a new one");
        assert_eq!(pool.siblings(root).len(), 2);

        (grammar, pool, root, leaf_id)
    }

    #[test]
    fn em_inside_can_diverge_from_em_greedy_when_a_childs_beta_dominates() {
        let (grammar, pool, root, _leaf_id) = diverging_em_greedy_and_em_inside_grammar_and_pool();

        let leaf_shrg = grammar.rules[0].cfg_rules[0].shrg_index;
        let alt1_shrg = grammar.rules[1].cfg_rules[0].shrg_index;
        let alt2_shrg = grammar.rules[2].cfg_rules[0].shrg_index;
        let mut weights = vec![0.0; grammar.cfg_rule_count()];
        weights[leaf_shrg] = 100.0f64.ln();
        weights[alt1_shrg] = 0.9f64.ln();
        weights[alt2_shrg] = 0.1f64.ln();

        let greedy_ctx = ExtractionContext {
            grammar: &grammar,
            pool: &pool,
            weights: &weights,
            beta: None,
            log_inside_count: None,
        };
        let greedy = extract(&greedy_ctx, root, ExtractionPolicy::EmGreedy);
        assert_eq!(greedy.rule_index, 1, "em-greedy should prefer the alternative with the higher own rule weight");

        let beta = super::super::inside_outside::inside(&grammar, &pool, root, &weights);
        let inside_ctx = ExtractionContext {
            grammar: &grammar,
            pool: &pool,
            weights: &weights,
            beta: Some(&beta),
            log_inside_count: None,
        };
        let by_inside = extract(&inside_ctx, root, ExtractionPolicy::EmInside);
        assert_eq!(
            by_inside.rule_index, 2,
            "em-inside should prefer the alternative whose child's high beta outweighs its own lower rule weight"
        );
    }

    /// Five-rule grammar: a three-way leaf OR-node (derivation count 3)
    /// used as `alt2`'s only child, versus `alt1` with no children at
    /// all (derivation count 1). `count-inside` must prefer whichever
    /// alternative's *children* carry more derivations — scoring the
    /// alternative itself (rather than its children) would find nothing
    /// in the canonical-keyed count map and degenerate into an
    /// arbitrary tie, which this test would catch.
    #[test]
    fn count_inside_prefers_the_alternative_with_more_derivations() {
        let grammar_text = "\
5
1
1 1
L 1 0 Y
1 0
1
0 1 1 Leaf 1
l -1
1
1 1
L 1 0 Y
1 0
1
1 1 1 Leaf 1
l -1
1
1 1
L 1 0 Y
1 0
1
2 1 1 Leaf 1
l -1
1
1 1
A1 1 0 Y
1 0
1
3 1 1 S 1
x -1
1
1 1
A2 1 0 Y
1 0
1
4 1 1 S 1
y -1
";
        let grammar = Grammar::load_from_str(grammar_text).unwrap();
        let mut pool = Pool::new(16);

        let leaf_label_hash = crate::label::make_label_hash(grammar.rules[0].label, 0, false);
        let mut leaf_root = None;
        for rule_index in 0..3 {
            let node = AndNode {
                id: AndNodeId(0),
                rule_index,
                cfg_rule_index: 0,
                label_hash: leaf_label_hash,
                edge_set: EdgeSet::singleton(1),
                node_mapping: NodeMapping::unbound(),
                children: Vec::new(),
                local_score: 0.0,
                next: AndNodeId(0),
            };
            let canonical = pool.insert(node).unwrap();
            leaf_root.get_or_insert(canonical);
        }
        let leaf_root = leaf_root.unwrap();
        assert_eq!(pool.siblings(leaf_root).len(), 3, "leaf OR-node should pack three equivalent alternatives");

        let s_label_hash = crate::label::make_label_hash(grammar.rules[3].label, 0, false);
        let alt1 = AndNode {
            id: AndNodeId(0),
            rule_index: 3,
            cfg_rule_index: 0,
            label_hash: s_label_hash,
            edge_set: EdgeSet::singleton(0),
            node_mapping: NodeMapping::unbound(),
            children: Vec::new(),
            local_score: 0.0,
            next: AndNodeId(0),
        };
        let root = pool.insert(alt1).unwrap();
        let alt2 = AndNode {
            id: AndNodeId(0),
            rule_index: 4,
            cfg_rule_index: 0,
            label_hash: s_label_hash,
            edge_set: EdgeSet::singleton(0),
            node_mapping: NodeMapping::unbound(),
            children: vec![leaf_root],
            local_score: 0.0,
            next: AndNodeId(0),
        };
        let alt2_id = pool.insert(alt2).unwrap();
        assert_eq!(alt2_id, root, "alt2 must join alt1's OR-node rather than start a new one");
        assert_eq!(pool.siblings(root).len(), 2);

        let weights = vec![0.0; grammar.cfg_rule_count()];
        let log_counts = super::super::analytics::log_derivation_counts(&pool, root);
        assert!(
            (log_counts[&leaf_root].exp() - 3.0).abs() < 1e-9,
            "leaf OR-node should have derivation count 3"
        );

        let ctx = ExtractionContext {
            grammar: &grammar,
            pool: &pool,
            weights: &weights,
            beta: None,
            log_inside_count: Some(&log_counts),
        };
        let chosen = extract(&ctx, root, ExtractionPolicy::CountInside);
        assert_eq!(
            chosen.rule_index, 4,
            "count-inside should prefer the alternative whose child subtree has more derivations"
        );
    }
}
