//! The packed derivation forest: inside-outside, ambiguity metrics,
//! extraction, and the generator hook, all addressed through a chart
//! [`Pool`] and a root [`AndNodeId`] (spec §3.2, §4.5-§4.7). Ported from
//! the original's `em_framework`/`ambiguity_metrics` split, recombined
//! here since both read the same pool/closure the parser already built.

pub mod analytics;
pub mod closure;
pub mod extraction;
pub mod generator;
pub mod inside_outside;

use std::collections::HashMap;

use crate::chart::{AndNodeId, Pool};
use crate::grammar::Grammar;

pub use analytics::{derivation_entropy, expected_derivation_count, forest_shape, log_derivation_count, log_derivation_counts, AmbiguityMetrics, ForestShape};
pub use closure::Closure;
pub use extraction::{align_gold, extract, extract_with_rng, Derivation, ExtractionContext, ExtractionPolicy};
pub use generator::{flatten_literals, generate_stream, GeneratorToken};
pub use inside_outside::{inside, outside_topological, rule_log_weight};

/// A parsed graph's forest: its chart pool plus the root OR-node
/// spanning the whole graph (spec §6.5's `ParseOutcome`/`Forest`
/// contract). Bundles the pieces `inside`/`outside`/extraction/metrics
/// all need, so library callers don't have to re-thread `pool`/`root`
/// through every call themselves.
pub struct Forest<'g> {
    pub grammar: &'g Grammar,
    pub pool: Pool,
    pub root: AndNodeId,
}

/// The inside/outside scores and normalising constant for one
/// `Forest` under one weight vector — the shared input every downstream
/// metric or extraction policy that needs `beta`/`alpha` consumes.
pub struct InsideOutside {
    pub beta: HashMap<AndNodeId, f64>,
    pub alpha: HashMap<AndNodeId, f64>,
    /// `beta(root)`, the forest's total log-probability mass (`log Z`).
    pub log_z: f64,
}

impl<'g> Forest<'g> {
    pub fn new(grammar: &'g Grammar, pool: Pool, root: AndNodeId) -> Self {
        Forest { grammar, pool, root }
    }

    /// Runs inside, then outside (topological, the normative variant),
    /// under `weights` (spec §4.5).
    pub fn inside_outside(&self, weights: &[f64]) -> InsideOutside {
        let beta = inside(self.grammar, &self.pool, self.root, weights);
        let closure = Closure::build(&self.pool);
        let alpha = outside_topological(self.grammar, &self.pool, &closure, self.root, &beta, weights);
        let log_z = beta.get(&self.root).copied().unwrap_or(f64::NEG_INFINITY);
        InsideOutside { beta, alpha, log_z }
    }

    /// Every canonical OR-node's `log_derivation_count`, reachable from
    /// this forest's root — the map `count-inside` extraction needs
    /// (spec §4.7).
    pub fn log_derivation_counts(&self) -> HashMap<AndNodeId, f64> {
        log_derivation_counts(&self.pool, self.root)
    }

    /// Ambiguity metrics bundle for this forest (spec §4.6 / §6.5).
    pub fn metrics(&self, io: &InsideOutside, weights: &[f64]) -> AmbiguityMetrics {
        let grammar = self.grammar;
        let entropy = derivation_entropy(&self.pool, self.root, &io.beta, &io.alpha, io.log_z, |alt| {
            rule_log_weight(grammar, self.pool.get(alt), weights)
        });
        AmbiguityMetrics {
            derivation_count: expected_derivation_count(&self.pool, self.root),
            log_derivation_count: log_derivation_count(&self.pool, self.root),
            entropy,
            shape: forest_shape(&self.pool, self.root),
        }
    }

    /// Extracts one derivation under `policy` (spec §4.7). `io` is
    /// required only for the `em-inside` policy's `beta` lookup.
    pub fn extract(
        &self,
        weights: &[f64],
        io: Option<&InsideOutside>,
        log_inside_count: Option<&HashMap<AndNodeId, f64>>,
        policy: ExtractionPolicy,
    ) -> Derivation {
        let ctx = ExtractionContext {
            grammar: self.grammar,
            pool: &self.pool,
            weights,
            beta: io.map(|io| &io.beta),
            log_inside_count,
        };
        extract(&ctx, self.root, policy)
    }

    /// Aligns a gold rule-index multiset against this forest (spec
    /// §4.7's "Gold derivation alignment").
    pub fn align_gold(
        &self,
        gold_rule_indices: &[usize],
        graph_id: Option<String>,
    ) -> crate::error::Result<Derivation> {
        align_gold(self.grammar, &self.pool, self.root, gold_rule_indices, graph_id)
    }
}
