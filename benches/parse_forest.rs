//! Benchmarks the chart parser and forest inside-outside pass over a
//! small ambiguous grammar/graph pair, across every `ParserStrategy`.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use shrg::em::initialize_weights;
use shrg::eds::parse_graph_file;
use shrg::grammar::Grammar;
use shrg::label::LabelTable;
use shrg::parser::{parse, ParseConfig, ParserStrategy};

fn ambiguous_grammar() -> Grammar {
    // S -> A B | A2 B2, A/A2/B/B2 each rewrite the same terminal two
    // different ways, so the chart packs a small but real OR-node cycle.
    let grammar_text = "\
5
1
1 1
A 1 0 Y
1 0
1
0 1 1 X 1
a -1
1
1 1
A 1 0 Y
1 0
1
1 1 1 X 1
a -1
1
1 1
A 1 0 Y
1 0
1
2 1 1 Y 1
b -1
1
1 1
A 1 0 Y
1 0
1
3 1 1 Y 1
b -1
1
2 2
X 1 0 N
Y 1 1 N
0
1
4 1 1 S 2
_ 0
_ 1
";
    Grammar::load_from_str(grammar_text).unwrap()
}

fn ambiguous_graph() -> shrg::eds::EdsGraph {
    // Two nodes each carrying the label token "A", so each contributes
    // its own virtual terminal edge (spec §6.2) and both "X -> A" and
    // "Y -> A" leaf rules can fire independently per node.
    let graph_text = "\
1
s1
a b
a b
2
0 n0 A a a a a
1 n1 A b b b b
0 0
";
    let mut labels = LabelTable::new();
    parse_graph_file(graph_text, &mut labels).unwrap().remove(0)
}

fn bench_parse(c: &mut Criterion) {
    let grammar = ambiguous_grammar();
    let graph = ambiguous_graph();

    let mut group = c.benchmark_group("parse_forest");
    for strategy in [
        ParserStrategy::Linear,
        ParserStrategy::TreeV1,
        ParserStrategy::TreeV2,
        ParserStrategy::TreeIndexV1,
        ParserStrategy::TreeIndexV2,
    ] {
        let config = ParseConfig {
            strategy,
            root_arity: 0,
            ..ParseConfig::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(format!("{strategy:?}")), &config, |b, config| {
            b.iter(|| parse(&grammar, &graph, config).unwrap());
        });
    }
    group.finish();
}

fn bench_inside_outside(c: &mut Criterion) {
    let grammar = ambiguous_grammar();
    let graph = ambiguous_graph();
    let config = ParseConfig::default();
    let outcome = parse(&grammar, &graph, &config).unwrap();
    let weights = initialize_weights(&grammar);

    c.bench_function("inside_outside", |b| {
        b.iter(|| {
            let beta = shrg::forest::inside(&grammar, &outcome.chart.pool, outcome.root, &weights);
            let closure = shrg::forest::Closure::build(&outcome.chart.pool);
            shrg::forest::outside_topological(&grammar, &outcome.chart.pool, &closure, outcome.root, &beta, &weights)
        });
    });
}

criterion_group!(benches, bench_parse, bench_inside_outside);
criterion_main!(benches);
