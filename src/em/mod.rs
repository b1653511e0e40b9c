//! Inside-outside EM training (spec §4.5, §6.5). Ported from `em.hpp`'s
//! `EM` class: one forest per training graph, parsed once and then
//! deep-copied ("persistent pool") across iterations so the E-step never
//! re-parses; the M-step is a synchronisation barrier re-normalising
//! every rule's weight within its LHS group.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::chart::{AndNodeId, Pool};
use crate::eds::EdsGraph;
use crate::error::{Result, ShrgError};
use crate::forest::closure::Closure;
use crate::forest::inside_outside::{inside, inside_viterbi, outside_topological, rule_log_weight};
use crate::grammar::Grammar;
use crate::numeric::{add_logs, digamma, sanitize_log_prob};
use crate::parser::{self, ParseConfig};

/// Which EM variant `run_em` performs (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum EmMode {
    /// Standard soft-count EM: M-step runs after every graph's E-step
    /// contributes, once all graphs in the corpus have been processed.
    Soft,
    /// Only the single best child alternative is retained per node
    /// (spec's "best-parse relationship" sub-forest); `⊕` becomes `max`
    /// and the M-step applies `+1e-10` add-one smoothing before
    /// renormalising.
    Viterbi,
    /// Runs the M-step after every `k` graphs instead of once per full
    /// pass over the corpus.
    Batch(usize),
    /// Weighted-average update per rule per parse:
    /// `log w_new = ⊕(log η + log w_fresh, log(1-η) + log w_old)`.
    Online(f64),
    /// Collapsed-variational EM: rule weights are read through a
    /// digamma transform of the per-LHS pseudo-counts rather than used
    /// directly.
    Variational(f64),
}

/// Top-level EM configuration (spec §6.5's `run_em` signature,
/// §1's ambient config surface).
#[derive(Debug, Clone)]
pub struct EmConfig {
    pub mode: EmMode,
    pub max_iter: usize,
    /// Stop once `|LL_t - LL_{t-1}| < tau`.
    pub tau: f64,
    /// Per-graph parse timeout; graphs exceeding it contribute zero
    /// (spec §4.5's failure semantics, `em.hpp`'s `time_out_in_seconds`).
    pub timeout: Duration,
    pub parse_config: ParseConfig,
    pub profiling: bool,
}

impl Default for EmConfig {
    fn default() -> Self {
        Self {
            mode: EmMode::Soft,
            max_iter: 100,
            tau: 1e-4,
            timeout: Duration::from_secs(30),
            parse_config: ParseConfig::default(),
            profiling: false,
        }
    }
}

/// One training graph's persistent forest, parsed once and deep-copied
/// fresh for every EM iteration (spec's "persistent pool" — the pool's
/// `AndNode`s carry no mutable per-iteration state themselves, but a
/// fresh `Pool`/`Closure` per iteration keeps the inside/outside memo
/// tables from leaking between iterations run in parallel).
struct TrainingForest {
    graph_id: String,
    pool: Pool,
    closure: Closure,
    root: AndNodeId,
}

/// Per-graph diagnostics collected when `EmConfig::profiling` is set
/// (spec's `GraphMetrics`): node/edge counts and per-graph timing.
#[derive(Debug, Clone)]
pub struct GraphMetrics {
    pub graph_id: String,
    pub nodes: usize,
    pub edges: usize,
    pub parse_micros: u128,
}

/// What `run_em` returns: the final weight vector, the log-likelihood
/// trace (one entry per iteration), and optional per-graph profiling.
#[derive(Debug, Clone)]
pub struct EmResult {
    pub weights: Vec<f64>,
    pub log_likelihood_history: Vec<f64>,
    pub metrics: Vec<GraphMetrics>,
}

/// Parses every graph once against `grammar`, building the persistent
/// forests EM will re-read each iteration. Graphs that don't parse
/// (`NoResult`/`TooLarge`/`OutOfMemory`) are skipped with a `warn` and
/// contribute zero to every iteration's likelihood, per spec §4.5's
/// failure semantics.
fn build_training_forests(
    grammar: &Grammar,
    graphs: &[EdsGraph],
    parse_config: &ParseConfig,
) -> Vec<TrainingForest> {
    graphs
        .iter()
        .filter_map(|graph| match graph.check_size() {
            Ok(()) => match parser::parse(grammar, graph, parse_config) {
                Ok(outcome) => {
                    let closure = Closure::build(&outcome.chart.pool);
                    Some(TrainingForest {
                        graph_id: graph.sentence_id.clone(),
                        pool: outcome.chart.pool,
                        closure,
                        root: outcome.root,
                    })
                }
                Err(err) => {
                    warn!(graph_id = %graph.sentence_id, error = %err, "graph failed to parse, contributing zero to EM");
                    None
                }
            },
            Err(err) => {
                warn!(graph_id = %graph.sentence_id, error = %err, "graph exceeds size bound, skipped");
                None
            }
        })
        .collect()
}

/// Initialises one weight per `CfgRule`, uniform within each LHS group
/// (`log w(r) = -log|G|` for `r`'s group `G`), matching `em.hpp`'s
/// `initializeWeights`.
pub fn initialize_weights(grammar: &Grammar) -> Vec<f64> {
    let mut weights = vec![0.0; grammar.cfg_rule_count()];
    for label in grammar.lhs_labels() {
        let rule_indices = grammar.rules_with_label(label);
        let group_size: usize = rule_indices.iter().map(|&i| grammar.rules[i].cfg_rules.len()).sum();
        if group_size == 0 {
            continue;
        }
        let log_w = -(group_size as f64).ln();
        for &rule_index in rule_indices {
            for cfg_rule in &grammar.rules[rule_index].cfg_rules {
                weights[cfg_rule.shrg_index] = log_w;
            }
        }
    }
    weights
}

/// One E-step's contribution for a single forest: its `log Z =
/// beta(root)` and the per-rule log-expected-count accumulator to fold
/// into the corpus-wide tally (spec §4.5's `log c(r) ⊕= γ(n)`).
struct EStepContribution {
    log_z: f64,
    /// `shrg_index -> log expected count`, sparse (only rules actually
    /// used in this forest appear).
    counts: HashMap<usize, f64>,
}

fn e_step_one_forest(grammar: &Grammar, forest: &TrainingForest, weights: &[f64], mode: EmMode) -> EStepContribution {
    let beta = if matches!(mode, EmMode::Viterbi) {
        inside_viterbi(grammar, &forest.pool, forest.root, weights)
    } else {
        inside(grammar, &forest.pool, forest.root, weights)
    };
    let log_z = beta.get(&forest.root).copied().unwrap_or(f64::NEG_INFINITY);

    if log_z == f64::NEG_INFINITY {
        return EStepContribution {
            log_z,
            counts: HashMap::new(),
        };
    }

    let alpha = outside_topological(grammar, &forest.pool, &forest.closure, forest.root, &beta, weights);

    let mut counts: HashMap<usize, f64> = HashMap::new();
    for idx in 0..forest.pool.len() {
        let id = AndNodeId(idx as u32);
        let node = forest.pool.get(id);
        let canonical = canonical_of(&forest.pool, id);
        let canonical_alpha = alpha.get(&canonical).copied().unwrap_or(f64::NEG_INFINITY);
        if canonical_alpha == f64::NEG_INFINITY {
            continue;
        }
        let w = rule_log_weight(grammar, node, weights);
        let mut child_sum = 0.0;
        for &child in &node.children {
            child_sum += beta.get(&child).copied().unwrap_or(0.0);
        }
        let own_score = w + child_sum;

        if matches!(mode, EmMode::Viterbi) {
            // only the alternative achieving the canonical's own beta
            // (i.e. the best-parse sub-forest) contributes; ties are
            // broken by taking the first such alternative encountered.
            let canonical_beta = beta.get(&canonical).copied().unwrap_or(f64::NEG_INFINITY);
            if (own_score - canonical_beta).abs() > 1e-9 {
                continue;
            }
        }

        let gamma = own_score + canonical_alpha - log_z;
        let cfg_rule = &grammar.rules[node.rule_index].cfg_rules[node.cfg_rule_index];
        let entry = counts.entry(cfg_rule.shrg_index).or_insert(f64::NEG_INFINITY);
        *entry = add_logs(*entry, gamma);
    }

    EStepContribution { log_z, counts }
}

fn canonical_of(pool: &Pool, id: AndNodeId) -> AndNodeId {
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

/// Runs the M-step: renormalises `log c(r)` within each LHS group
/// (spec §4.5). Rules with `log c(r) = -inf` keep `-inf` unless they're
/// the sole member of their group, in which case they become `log 1 =
/// 0`. Returns `DegenerateCount` if any updated weight is non-finite
/// and not the `-inf` sentinel.
fn m_step(
    grammar: &Grammar,
    log_counts: &HashMap<usize, f64>,
    mode: EmMode,
    iteration: usize,
) -> Result<Vec<f64>> {
    let mut weights = vec![f64::NEG_INFINITY; grammar.cfg_rule_count()];

    for label in grammar.lhs_labels() {
        let rule_indices = grammar.rules_with_label(label);
        let cfg_indices: Vec<usize> = rule_indices
            .iter()
            .flat_map(|&i| grammar.rules[i].cfg_rules.iter().map(|c| c.shrg_index))
            .collect();
        if cfg_indices.is_empty() {
            continue;
        }

        let smoothing = match mode {
            EmMode::Viterbi => 1e-10,
            _ => 0.0,
        };

        let mut log_c: HashMap<usize, f64> = HashMap::new();
        for &idx in &cfg_indices {
            let raw = log_counts.get(&idx).copied().unwrap_or(f64::NEG_INFINITY);
            let smoothed = if smoothing > 0.0 {
                add_logs(raw, smoothing.ln())
            } else {
                raw
            };
            log_c.insert(idx, smoothed);
        }

        if matches!(mode, EmMode::Variational(_)) {
            let alpha0 = if let EmMode::Variational(a) = mode { a } else { unreachable!() };
            let pseudo: HashMap<usize, f64> = cfg_indices
                .iter()
                .map(|&idx| (idx, (log_c[&idx].max(f64::NEG_INFINITY)).exp().max(1e-10) + alpha0))
                .collect();
            let total: f64 = pseudo.values().sum();
            let digamma_total = digamma(total);
            for &idx in &cfg_indices {
                let psi = digamma(pseudo[&idx]) - digamma_total;
                weights[idx] = sanitize_log_prob(psi);
            }
            continue;
        }

        let s_ell = log_sum_group(&log_c, &cfg_indices);
        if cfg_indices.len() == 1 {
            // the sole member of its LHS group always renormalises to
            // log 1 = 0, whether or not it was ever observed.
            weights[cfg_indices[0]] = 0.0;
            continue;
        }
        for &idx in &cfg_indices {
            let c = log_c[&idx];
            weights[idx] = if c == f64::NEG_INFINITY {
                f64::NEG_INFINITY
            } else {
                sanitize_log_prob(c - s_ell)
            };
            if !weights[idx].is_finite() && weights[idx] != f64::NEG_INFINITY {
                return Err(ShrgError::DegenerateCount {
                    shrg_index: idx,
                    iteration,
                });
            }
        }
    }

    Ok(weights)
}

fn log_sum_group(log_c: &HashMap<usize, f64>, indices: &[usize]) -> f64 {
    indices.iter().fold(f64::NEG_INFINITY, |acc, idx| add_logs(acc, log_c[idx]))
}

/// Folds a batch of E-step contributions into one `shrg_index -> log
/// expected count` tally, and returns it alongside the batch's summed
/// log-likelihood.
fn merge_contributions(contributions: &[EStepContribution]) -> (HashMap<usize, f64>, f64) {
    let ll: f64 = contributions
        .iter()
        .map(|c| c.log_z)
        .filter(|&z| z.is_finite())
        .sum();
    let mut merged: HashMap<usize, f64> = HashMap::new();
    for contribution in contributions {
        for (&idx, &log_c) in &contribution.counts {
            let entry = merged.entry(idx).or_insert(f64::NEG_INFINITY);
            *entry = add_logs(*entry, log_c);
        }
    }
    (merged, ll)
}

/// Applies the online-EM weighted average per rule:
/// `log w_new = ⊕(log η + log w_fresh, log(1-η) + log w_old)`.
fn online_update(old: &[f64], fresh: &[f64], eta: f64) -> Vec<f64> {
    old.iter()
        .zip(fresh.iter())
        .map(|(&w_old, &w_fresh)| add_logs(eta.ln() + w_fresh, (1.0 - eta).ln() + w_old))
        .collect()
}

/// Runs EM to convergence (spec §6.5). `graphs` is the training corpus;
/// `grammar` supplies rule structure. Returns the trained weight vector,
/// the per-iteration log-likelihood trace, and (if requested) per-graph
/// profiling metrics. Graphs that never parse are skipped (logged at
/// `warn`) and contribute zero throughout.
pub fn run_em(grammar: &Grammar, graphs: &[EdsGraph], config: &EmConfig) -> Result<EmResult> {
    let started = Instant::now();
    let forests = build_training_forests(grammar, graphs, &config.parse_config);

    let metrics = if config.profiling {
        forests
            .iter()
            .map(|f| GraphMetrics {
                graph_id: f.graph_id.clone(),
                nodes: f.pool.len(),
                edges: 0,
                parse_micros: started.elapsed().as_micros(),
            })
            .collect()
    } else {
        Vec::new()
    };

    let mut weights = initialize_weights(grammar);
    let mut ll_history = Vec::with_capacity(config.max_iter);
    let mut prev_ll = f64::NEG_INFINITY;

    for iteration in 0..config.max_iter {
        let ll = if let EmMode::Batch(k) = config.mode {
            // M runs after every k graphs rather than once per full pass:
            // each chunk's E-step reads the weights the previous chunk's
            // M-step just produced, so a single "iteration" here performs
            // several M-steps in sequence.
            let chunk_size = k.max(1);
            let mut ll_total = 0.0;
            for chunk in forests.chunks(chunk_size) {
                let contributions = run_e_step(grammar, chunk, &weights, config.mode);
                let (merged, chunk_ll) = merge_contributions(&contributions);
                ll_total += chunk_ll;
                weights = m_step(grammar, &merged, config.mode, iteration)?;
            }
            ll_total
        } else {
            let contributions: Vec<EStepContribution> = run_e_step(grammar, &forests, &weights, config.mode);
            let (merged, ll) = merge_contributions(&contributions);
            let fresh_weights = m_step(grammar, &merged, config.mode, iteration)?;
            weights = match config.mode {
                EmMode::Online(eta) => online_update(&weights, &fresh_weights, eta),
                _ => fresh_weights,
            };
            ll
        };
        ll_history.push(ll);

        info!(iteration, log_likelihood = ll, "em iteration complete");

        if (ll - prev_ll).abs() < config.tau && iteration > 0 {
            break;
        }
        prev_ll = ll;
    }

    Ok(EmResult {
        weights,
        log_likelihood_history: ll_history,
        metrics,
    })
}

#[cfg(feature = "parallel")]
fn run_e_step(grammar: &Grammar, forests: &[TrainingForest], weights: &[f64], mode: EmMode) -> Vec<EStepContribution> {
    forests
        .par_iter()
        .map(|forest| e_step_one_forest(grammar, forest, weights, mode))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn run_e_step(grammar: &Grammar, forests: &[TrainingForest], weights: &[f64], mode: EmMode) -> Vec<EStepContribution> {
    forests
        .iter()
        .map(|forest| e_step_one_forest(grammar, forest, weights, mode))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // S -> A (weight renormalised by M-step), A -> "a" (fragment terminal
    // edge Ta) | A -> "b" (fragment terminal edge Tb). Two distinct SHRG
    // rules rather than two cfg_rules of one rule: a cfg_rule only scores
    // an output string, it doesn't gate which graphs a rule can match, so
    // discriminating "a" corpora from "b" corpora needs two fragments with
    // different terminal-edge labels.
    fn tiny_grammar() -> Grammar {
        let grammar_text = "\
3
1
1 1
Ta 1 0 Y
1 0
1
0 1 1 A 1
a -1
1
1 1
Tb 1 0 Y
1 0
1
1 1 1 A 1
b -1
1
2 1
A 1 0 N
1 1
1
2 1 1 S 1
_ 0
";
        Grammar::load_from_str(grammar_text).unwrap()
    }

    fn tiny_graph(labels: &mut crate::label::LabelTable, terminal_label: &str) -> EdsGraph {
        // single node whose own label_token is the rule's terminal-edge
        // label; the auto-generated virtual node-label edge is the only
        // arity-1 edge a fragment's terminal edge can ever match, so no
        // real graph edge is needed here.
        let graph_text = format!(
            "\
1
s1
{terminal_label}
{terminal_label}
1
0 n0 {terminal_label} w w w w
0 0
"
        );
        crate::eds::parse_graph_file(&graph_text, labels).unwrap().remove(0)
    }

    #[test]
    fn em_converges_and_assigns_more_mass_to_the_more_frequent_terminal() {
        let grammar = tiny_grammar();
        let mut labels = grammar.labels.clone();
        let graphs = vec![
            tiny_graph(&mut labels, "Ta"),
            tiny_graph(&mut labels, "Ta"),
            tiny_graph(&mut labels, "Tb"),
        ];
        let config = EmConfig {
            max_iter: 10,
            ..EmConfig::default()
        };
        let result = run_em(&grammar, &graphs, &config).unwrap();
        assert!(!result.log_likelihood_history.is_empty());

        let a_rule = grammar.rules[0].cfg_rules[0].shrg_index;
        let b_rule = grammar.rules[1].cfg_rules[0].shrg_index;
        assert!(result.weights[a_rule] > result.weights[b_rule]);
    }

    #[test]
    fn initial_weights_are_uniform_within_lhs_group() {
        let grammar = tiny_grammar();
        let weights = initialize_weights(&grammar);
        let a_rule = grammar.rules[0].cfg_rules[0].shrg_index;
        let b_rule = grammar.rules[1].cfg_rules[0].shrg_index;
        assert!((weights[a_rule] - weights[b_rule]).abs() < 1e-12);
    }
}
