//! `shrg` CLI: a thin `clap`-derived front end over the library's
//! programmatic contract (parse, train, extract, metrics, generate).
//! Uses `anyhow` at the process boundary to unify the library's typed
//! `ShrgError` with I/O and config failures into one reportable chain.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use shrg::forest::flatten_literals;
use shrg::forest::Derivation;
use shrg::io::{derivation_file, load_grammar_file, load_graph_file};
use shrg::{Config, ExtractionPolicy, Forest};

#[derive(Parser)]
#[command(name = "shrg", about = "SHRG chart parser, packed forest, and EM trainer")]
struct Cli {
    /// Path to a TOML config file (spec §1's ambient config surface);
    /// omitted fields fall back to built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parses every graph in a graph file against a grammar, reporting
    /// one parse outcome per graph.
    Parse {
        grammar: PathBuf,
        graphs: PathBuf,
    },
    /// Trains rule weights by EM over a graph-file corpus.
    Train {
        grammar: PathBuf,
        graphs: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Extracts and prints one derivation per graph, under a chosen
    /// extraction policy.
    Extract {
        grammar: PathBuf,
        graphs: PathBuf,
        #[arg(long, default_value = "em-greedy")]
        policy: String,
    },
    /// Reports ambiguity metrics (derivation count, entropy, forest
    /// shape) for every graph's forest.
    Metrics { grammar: PathBuf, graphs: PathBuf },
    /// Walks one extracted derivation's generator-hook token stream and
    /// prints the flattened literal sequence.
    Generate {
        grammar: PathBuf,
        graphs: PathBuf,
        #[arg(long, default_value = "em-greedy")]
        policy: String,
    },
}

fn parse_policy(name: &str) -> Result<ExtractionPolicy> {
    Ok(match name {
        "em-greedy" => ExtractionPolicy::EmGreedy,
        "em-inside" => ExtractionPolicy::EmInside,
        "count-greedy" => ExtractionPolicy::CountGreedy,
        "count-inside" => ExtractionPolicy::CountInside,
        "sample" => ExtractionPolicy::Sample,
        "uniform" => ExtractionPolicy::Uniform,
        other => anyhow::bail!("unknown extraction policy {other:?}"),
    })
}

/// Extracts one derivation under `policy`, computing only the
/// precomputed inputs that policy actually needs: `em-inside` needs
/// inside/outside scores, `count-inside` needs the per-canonical
/// log-derivation-count map (spec §4.7). Every other policy reads
/// straight off `weights`.
fn extract_for_policy(forest: &Forest, weights: &[f64], policy: ExtractionPolicy) -> Derivation {
    let io = matches!(policy, ExtractionPolicy::EmInside).then(|| forest.inside_outside(weights));
    let log_counts = matches!(policy, ExtractionPolicy::CountInside).then(|| forest.log_derivation_counts());
    forest.extract(weights, io.as_ref(), log_counts.as_ref(), policy)
}

fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    match path {
        Some(p) => Config::load_from_file(p).with_context(|| format!("loading config {}", p.display())),
        None => Ok(Config::default()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Parse { grammar, graphs } => cmd_parse(&grammar, &graphs, &config),
        Command::Train { grammar, graphs, out } => cmd_train(&grammar, &graphs, out, &config),
        Command::Extract { grammar, graphs, policy } => cmd_extract(&grammar, &graphs, &policy, &config),
        Command::Metrics { grammar, graphs } => cmd_metrics(&grammar, &graphs, &config),
        Command::Generate { grammar, graphs, policy } => cmd_generate(&grammar, &graphs, &policy, &config),
    }
}

fn cmd_parse(grammar_path: &PathBuf, graphs_path: &PathBuf, config: &Config) -> Result<()> {
    let grammar = load_grammar_file(grammar_path)?;
    let mut labels = grammar.labels.clone();
    let graphs = load_graph_file(graphs_path, &mut labels)?;
    let parse_config = config.parse_config();

    let mut ok = 0;
    let mut failed = 0;
    for graph in &graphs {
        match shrg::parse(&grammar, graph, &parse_config) {
            Ok(outcome) => {
                ok += 1;
                println!("{}: parsed, {} chart items", graph.sentence_id, outcome.chart.pool.len());
            }
            Err(err) => {
                failed += 1;
                println!("{}: failed ({err})", graph.sentence_id);
            }
        }
    }
    info!(ok, failed, "parse run complete");
    Ok(())
}

fn cmd_train(grammar_path: &PathBuf, graphs_path: &PathBuf, out: Option<PathBuf>, config: &Config) -> Result<()> {
    let grammar = load_grammar_file(grammar_path)?;
    let mut labels = grammar.labels.clone();
    let graphs = load_graph_file(graphs_path, &mut labels)?;

    let em_config = config.em_config();
    let result = shrg::run_em(&grammar, &graphs, &em_config)?;

    if let Some(path) = out {
        let history: Vec<Vec<f64>> = result.weights.iter().map(|&w| vec![w]).collect();
        shrg::io::weight_history::write_weight_history(&path, &history)?;
        info!(path = %path.display(), "wrote final weights");
    }

    for (iteration, ll) in result.log_likelihood_history.iter().enumerate() {
        println!("iteration {iteration}: log-likelihood {ll}");
    }
    Ok(())
}

fn cmd_extract(grammar_path: &PathBuf, graphs_path: &PathBuf, policy: &str, config: &Config) -> Result<()> {
    let policy = parse_policy(policy)?;
    let grammar = load_grammar_file(grammar_path)?;
    let mut labels = grammar.labels.clone();
    let graphs = load_graph_file(graphs_path, &mut labels)?;
    let parse_config = config.parse_config();
    let weights = shrg::em::initialize_weights(&grammar);

    for graph in &graphs {
        let outcome = match shrg::parse(&grammar, graph, &parse_config) {
            Ok(o) => o,
            Err(err) => {
                println!("{}: skipped ({err})", graph.sentence_id);
                continue;
            }
        };
        let forest = Forest::new(&grammar, outcome.chart.pool, outcome.root);
        let derivation = extract_for_policy(&forest, &weights, policy);
        let text = derivation_file::format_derivation(&grammar, &forest.pool, &graph.sentence_id, &derivation);
        print!("{text}");
    }
    Ok(())
}

fn cmd_metrics(grammar_path: &PathBuf, graphs_path: &PathBuf, config: &Config) -> Result<()> {
    let grammar = load_grammar_file(grammar_path)?;
    let mut labels = grammar.labels.clone();
    let graphs = load_graph_file(graphs_path, &mut labels)?;
    let parse_config = config.parse_config();
    let weights = shrg::em::initialize_weights(&grammar);

    for graph in &graphs {
        let outcome = match shrg::parse(&grammar, graph, &parse_config) {
            Ok(o) => o,
            Err(err) => {
                println!("{}: skipped ({err})", graph.sentence_id);
                continue;
            }
        };
        let forest = Forest::new(&grammar, outcome.chart.pool, outcome.root);
        let io = forest.inside_outside(&weights);
        let metrics = forest.metrics(&io, &weights);
        println!(
            "{}: derivations={:.3} log_derivations={:.3} entropy={:.3} nodes={} edges={} depth={}",
            graph.sentence_id,
            metrics.derivation_count,
            metrics.log_derivation_count,
            metrics.entropy,
            metrics.shape.nodes,
            metrics.shape.edges,
            metrics.shape.max_depth,
        );
    }
    Ok(())
}

fn cmd_generate(grammar_path: &PathBuf, graphs_path: &PathBuf, policy: &str, config: &Config) -> Result<()> {
    let policy = parse_policy(policy)?;
    let grammar = load_grammar_file(grammar_path)?;
    let mut labels = grammar.labels.clone();
    let graphs = load_graph_file(graphs_path, &mut labels)?;
    let parse_config = config.parse_config();
    let weights = shrg::em::initialize_weights(&grammar);

    for graph in &graphs {
        let outcome = match shrg::parse(&grammar, graph, &parse_config) {
            Ok(o) => o,
            Err(err) => {
                println!("{}: skipped ({err})", graph.sentence_id);
                continue;
            }
        };
        let forest = Forest::new(&grammar, outcome.chart.pool, outcome.root);
        let derivation = extract_for_policy(&forest, &weights, policy);
        let literals = flatten_literals(&grammar, &derivation);
        println!("{}: {}", graph.sentence_id, literals.join(" "));
    }
    Ok(())
}
