//! Derivation text output (spec §6.4):
//! ```text
//! Graph_ID: <sentence_id>
//! Rule_Indices: <i1> <i2> ...
//! Edge_Sets: <bitstring_1> <bitstring_2> ...
//! ```
//! `rule_indices`/`edge_sets` are the extracted derivation's AND-nodes
//! in pre-order, each edge set rendered as a fixed-width 256-character
//! `{0,1}` string. Ported from `get_derivation_edges.cpp`'s text writer.

use crate::chart::{EdgeSet, Pool};
use crate::eds::MAX_GRAPH_EDGE_COUNT;
use crate::error::{Result, ShrgError};
use crate::forest::Derivation;
use crate::grammar::Grammar;

/// One parsed/formatted derivation record.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivationRecord {
    pub graph_id: String,
    pub rule_indices: Vec<usize>,
    pub edge_sets: Vec<EdgeSet>,
}

/// Walks `derivation` pre-order, pairing each AND-node's
/// `CfgRule::shrg_index` with its `edge_set`.
fn collect(pool: &Pool, grammar: &Grammar, derivation: &Derivation, out: &mut DerivationRecord) {
    let cfg_rule = &grammar.rules[derivation.rule_index].cfg_rules[derivation.cfg_rule_index];
    out.rule_indices.push(cfg_rule.shrg_index);
    out.edge_sets.push(pool.get(derivation.and_node).edge_set.clone());
    for child in &derivation.children {
        collect(pool, grammar, child, out);
    }
}

/// Renders `derivation` in spec §6.4 text format.
pub fn format_derivation(grammar: &Grammar, pool: &Pool, graph_id: &str, derivation: &Derivation) -> String {
    let mut record = DerivationRecord {
        graph_id: graph_id.to_string(),
        rule_indices: Vec::new(),
        edge_sets: Vec::new(),
    };
    collect(pool, grammar, derivation, &mut record);
    format_record(&record)
}

fn edge_set_to_bitstring(edge_set: &EdgeSet) -> String {
    (0..MAX_GRAPH_EDGE_COUNT)
        .map(|i| if edge_set.contains(i) { '1' } else { '0' })
        .collect()
}

fn bitstring_to_edge_set(bits: &str) -> Result<EdgeSet> {
    if bits.len() != MAX_GRAPH_EDGE_COUNT {
        return Err(ShrgError::ParseFormat {
            location: "derivation file".to_string(),
            reason: format!("edge-set bitstring must be {MAX_GRAPH_EDGE_COUNT} chars, got {}", bits.len()),
        });
    }
    let mut edge_set = EdgeSet::empty();
    for (i, c) in bits.chars().enumerate() {
        match c {
            '1' => edge_set.insert(i),
            '0' => {}
            other => {
                return Err(ShrgError::ParseFormat {
                    location: "derivation file".to_string(),
                    reason: format!("expected '0'/'1' in edge-set bitstring, got {other:?}"),
                })
            }
        }
    }
    Ok(edge_set)
}

/// Renders an already-collected [`DerivationRecord`].
pub fn format_record(record: &DerivationRecord) -> String {
    let rule_indices = record
        .rule_indices
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    let edge_sets = record
        .edge_sets
        .iter()
        .map(edge_set_to_bitstring)
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "Graph_ID: {}\nRule_Indices: {}\nEdge_Sets: {}\n",
        record.graph_id, rule_indices, edge_sets
    )
}

/// Parses one spec §6.4 derivation record.
pub fn parse_derivation(text: &str) -> Result<DerivationRecord> {
    let mut lines = text.lines();

    let graph_id_line = lines.next().ok_or_else(missing("Graph_ID line"))?;
    let graph_id = graph_id_line
        .strip_prefix("Graph_ID:")
        .ok_or_else(malformed("expected 'Graph_ID:' prefix"))?
        .trim()
        .to_string();

    let rule_indices_line = lines.next().ok_or_else(missing("Rule_Indices line"))?;
    let rule_indices_text = rule_indices_line
        .strip_prefix("Rule_Indices:")
        .ok_or_else(malformed("expected 'Rule_Indices:' prefix"))?
        .trim();
    let rule_indices: Vec<usize> = if rule_indices_text.is_empty() {
        Vec::new()
    } else {
        rule_indices_text
            .split_whitespace()
            .map(|tok| {
                tok.parse().map_err(|_| ShrgError::ParseFormat {
                    location: "derivation file".to_string(),
                    reason: format!("bad rule index {tok:?}"),
                })
            })
            .collect::<Result<_>>()?
    };

    let edge_sets_line = lines.next().ok_or_else(missing("Edge_Sets line"))?;
    let edge_sets_text = edge_sets_line
        .strip_prefix("Edge_Sets:")
        .ok_or_else(malformed("expected 'Edge_Sets:' prefix"))?
        .trim();
    let edge_sets: Vec<EdgeSet> = if edge_sets_text.is_empty() {
        Vec::new()
    } else {
        edge_sets_text
            .split_whitespace()
            .map(bitstring_to_edge_set)
            .collect::<Result<_>>()?
    };

    if rule_indices.len() != edge_sets.len() {
        return Err(ShrgError::ParseFormat {
            location: "derivation file".to_string(),
            reason: "Rule_Indices and Edge_Sets have different lengths".to_string(),
        });
    }

    Ok(DerivationRecord {
        graph_id,
        rule_indices,
        edge_sets,
    })
}

fn missing(what: &'static str) -> impl Fn() -> ShrgError {
    move || ShrgError::ParseFormat {
        location: "derivation file".to_string(),
        reason: format!("expected {what}, hit end of input"),
    }
}

fn malformed(reason: &'static str) -> impl Fn() -> ShrgError {
    move || ShrgError::ParseFormat {
        location: "derivation file".to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_record_through_text() {
        let mut edge_set = EdgeSet::empty();
        edge_set.insert(0);
        edge_set.insert(5);
        let record = DerivationRecord {
            graph_id: "s1".to_string(),
            rule_indices: vec![2, 0],
            edge_sets: vec![edge_set.clone(), EdgeSet::empty()],
        };
        let text = format_record(&record);
        assert!(text.contains("Graph_ID: s1"));
        assert!(text.contains("Rule_Indices: 2 0"));

        let parsed = parse_derivation(&text).unwrap();
        assert_eq!(parsed.graph_id, "s1");
        assert_eq!(parsed.rule_indices, vec![2, 0]);
        assert_eq!(parsed.edge_sets[0], edge_set);
    }

    #[test]
    fn bitstring_must_be_256_chars() {
        let text = "Graph_ID: s1\nRule_Indices: 0\nEdge_Sets: 01\n";
        assert!(parse_derivation(text).is_err());
    }
}
