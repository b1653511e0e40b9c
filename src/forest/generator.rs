//! Generator hook (spec §4's "component 11"): walks one resolved
//! [`Derivation`] and emits its `CfgRule::items` stream in derivation
//! order. Actual surface realisation (string formatting, morphology,
//! linearisation search) is out of scope — this only exposes the
//! ordered item stream a realiser would consume, mirroring how
//! `generator.cpp` is cited by the original as the hook boundary rather
//! than folding realisation into the forest itself.

use crate::grammar::{CfgItem, Grammar};

use super::extraction::Derivation;

/// One generator-facing token: either a literal string or a reference
/// to the child derivation aligned to a fragment edge.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratorToken<'a> {
    Literal(&'a str),
    Child(&'a Derivation),
}

/// Emits `derivation`'s own `CfgRule::items`, resolving each
/// `CfgItem::Aligned` edge to the specific child `Derivation` whose
/// `AndNode` was built for that edge. Non-recursive: callers walk the
/// returned stream and recurse into `GeneratorToken::Child` themselves,
/// so a realiser can interleave its own linearisation logic between
/// levels instead of receiving a pre-flattened string.
pub fn generate_stream<'a>(grammar: &'a Grammar, derivation: &'a Derivation) -> Vec<GeneratorToken<'a>> {
    let rule = &grammar.rules[derivation.rule_index];
    let cfg_rule = &rule.cfg_rules[derivation.cfg_rule_index];

    // `non_terminal_edges` is the order `AndNode::children` was built in
    // (spec §4.1/§4.3); map each aligned edge to its position there.
    cfg_rule
        .items
        .iter()
        .map(|item| match item {
            CfgItem::Literal(s) => GeneratorToken::Literal(s.as_str()),
            CfgItem::Aligned(edge) => {
                let child_position = rule
                    .non_terminal_edges
                    .iter()
                    .position(|&e| e == *edge)
                    .expect("CfgItem aligned to an edge absent from the rule's non-terminal set");
                GeneratorToken::Child(&derivation.children[child_position])
            }
        })
        .collect()
}

/// Recursively flattens `derivation` into a single token stream of
/// `&str` literals, depth-first. A convenience for callers that don't
/// need per-level control; still not full surface realisation (no
/// spacing/morphology decisions beyond literal concatenation order).
pub fn flatten_literals<'a>(grammar: &'a Grammar, derivation: &'a Derivation) -> Vec<&'a str> {
    let mut out = Vec::new();
    flatten_into(grammar, derivation, &mut out);
    out
}

fn flatten_into<'a>(grammar: &'a Grammar, derivation: &'a Derivation, out: &mut Vec<&'a str>) {
    for token in generate_stream(grammar, derivation) {
        match token {
            GeneratorToken::Literal(s) => out.push(s),
            GeneratorToken::Child(child) => flatten_into(grammar, child, out),
        }
    }
}
