//! Parses the text grammar file format of spec §6.1. Grounded in the
//! teacher's `parse_grammar.rs` (regex-driven DSL parsing idiom), though
//! this format is fixed-width/line-oriented rather than free text, so a
//! simple line-tokenising reader is closer to the original C++ loader's
//! structure (`synchronous_hyperedge_replacement_grammar.cpp::Load`).
//!
//! Label tokens (`<label>`, `<label_token>`) are interned through the
//! same `LabelTable` the graph-file reader uses (§6.2), mirroring
//! `SHRG::Load`/`EdsGraph::Load`'s shared `TokenSet` parameter in
//! `original_source`.

use crate::error::{Result, ShrgError};
use crate::hypergraph::{EdgeIdx, Hypergraph, NodeIdx};
use crate::label::{Label, LabelTable};

use super::rule::{CfgItem, CfgRule, ShrgRule};

struct Cursor<'a> {
    lines: std::vec::IntoIter<&'a str>,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            lines: input.lines().collect::<Vec<_>>().into_iter(),
        }
    }

    fn line(&mut self, what: &str) -> Result<&'a str> {
        self.lines.next().ok_or_else(|| ShrgError::ParseFormat {
            location: "grammar file".to_string(),
            reason: format!("expected {what}, hit end of input"),
        })
    }

    fn tokens(&mut self, what: &str) -> Result<Vec<&'a str>> {
        Ok(self.line(what)?.split_whitespace().collect())
    }

    fn token_line<T: std::str::FromStr>(&mut self, what: &str) -> Result<T> {
        let line = self.line(what)?;
        line.trim()
            .parse::<T>()
            .map_err(|_| ShrgError::ParseFormat {
                location: "grammar file".to_string(),
                reason: format!("couldn't parse {what} from {line:?}"),
            })
    }
}

fn parse_num(tok: &str, what: &str) -> Result<i64> {
    tok.parse::<i64>().map_err(|_| ShrgError::ParseFormat {
        location: "grammar file".to_string(),
        reason: format!("couldn't parse {what} from {tok:?}"),
    })
}

/// Parses the full grammar-file contents into raw, unindexed
/// `ShrgRule`s (grammar/preindex::build still needs to run over each to
/// finalise edge ordering and per-rule indexes).
pub fn parse_rules(input: &str, labels: &mut LabelTable) -> Result<Vec<ShrgRule>> {
    let mut cur = Cursor::new(input);
    let rule_count: usize = cur.token_line("rule_count")?;

    let mut rules = Vec::with_capacity(rule_count);
    for rule_index in 0..rule_count {
        let has_fragment: i32 = cur.token_line("has_fragment")?;

        let (fragment, external_nodes, terminal_edges, non_terminal_edges) = if has_fragment == 1
        {
            parse_fragment(&mut cur, labels, rule_index)?
        } else {
            (Hypergraph::new(), Vec::new(), Vec::new(), Vec::new())
        };

        let num_cfg_rules: usize = cur.token_line("num_cfg_rules")?;
        let mut cfg_rules = Vec::with_capacity(num_cfg_rules);
        for _ in 0..num_cfg_rules {
            cfg_rules.push(parse_cfg_rule(&mut cur, labels, rule_index)?);
        }

        // the rule's own label is defined by its cfg rules (spec §3.1's
        // invariant that every cfg_rule.label equals the rule label);
        // a rule with no cfg rules at all (fully filtered/disconnected,
        // per original_source's FilterDisconnected) gets Label::EMPTY.
        let label = cfg_rules.first().map(|c: &CfgRule| c.label).unwrap_or(Label::EMPTY);
        for cfg_rule in &cfg_rules {
            if cfg_rule.label != label {
                return Err(ShrgError::MalformedGrammar {
                    rule_index,
                    reason: "cfg rules of one SHRG rule disagree on label".to_string(),
                });
            }
        }

        rules.push(ShrgRule {
            label,
            fragment,
            external_nodes,
            terminal_edges,
            non_terminal_edges,
            cfg_rules,
        });
    }

    validate_shrg_indices(&rules, rule_count)?;
    Ok(rules)
}

#[allow(clippy::type_complexity)]
fn parse_fragment<'a>(
    cur: &mut Cursor<'a>,
    labels: &mut LabelTable,
    rule_index: usize,
) -> Result<(Hypergraph<(), ()>, Vec<NodeIdx>, Vec<EdgeIdx>, Vec<EdgeIdx>)> {
    let header = cur.tokens("num_nodes num_edges")?;
    if header.len() != 2 {
        return Err(ShrgError::MalformedGrammar {
            rule_index,
            reason: "expected `<num_nodes> <num_edges>`".to_string(),
        });
    }
    let num_nodes: usize = header[0].parse().map_err(|_| ShrgError::MalformedGrammar {
        rule_index,
        reason: "bad num_nodes".to_string(),
    })?;
    let num_edges: usize = header[1].parse().map_err(|_| ShrgError::MalformedGrammar {
        rule_index,
        reason: "bad num_edges".to_string(),
    })?;

    let mut fragment: Hypergraph<(), ()> = Hypergraph::new();
    for _ in 0..num_nodes {
        fragment.add_node(false, ());
    }

    let mut terminal_edges = Vec::new();
    let mut non_terminal_edges = Vec::new();
    for _ in 0..num_edges {
        let toks = cur.tokens("edge")?;
        if toks.len() < 3 {
            return Err(ShrgError::MalformedGrammar {
                rule_index,
                reason: "malformed edge line".to_string(),
            });
        }
        let label = labels.intern(toks[0]);
        let arity: usize = toks[1].parse().map_err(|_| ShrgError::MalformedGrammar {
            rule_index,
            reason: "bad edge arity".to_string(),
        })?;
        if toks.len() != 2 + arity + 1 {
            return Err(ShrgError::MalformedGrammar {
                rule_index,
                reason: "edge arity doesn't match node index count".to_string(),
            });
        }
        let mut linked = Vec::with_capacity(arity);
        for i in 0..arity {
            let idx: u32 = toks[2 + i].parse().map_err(|_| ShrgError::MalformedGrammar {
                rule_index,
                reason: "bad node index in edge".to_string(),
            })?;
            linked.push(NodeIdx(idx));
        }
        let is_terminal = match toks[2 + arity] {
            "Y" => true,
            "N" => false,
            other => {
                return Err(ShrgError::MalformedGrammar {
                    rule_index,
                    reason: format!("expected Y/N for is_terminal, got {other:?}"),
                })
            }
        };
        let e = fragment.add_edge(label, is_terminal, linked, ());
        if is_terminal {
            terminal_edges.push(e);
        } else {
            non_terminal_edges.push(e);
        }
    }

    let ext_header = cur.tokens("num_external")?;
    let num_external: usize = ext_header
        .first()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ShrgError::MalformedGrammar {
            rule_index,
            reason: "bad num_external".to_string(),
        })?;
    let mut external_nodes = Vec::with_capacity(num_external);
    for i in 0..num_external {
        let idx: u32 = ext_header
            .get(1 + i)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ShrgError::MalformedGrammar {
                rule_index,
                reason: "missing external node index".to_string(),
            })?;
        external_nodes.push(NodeIdx(idx));
        fragment.nodes[idx as usize].is_external = true;
    }

    fragment.recompute_node_types();
    Ok((fragment, external_nodes, terminal_edges, non_terminal_edges))
}

fn parse_cfg_rule<'a>(
    cur: &mut Cursor<'a>,
    labels: &mut LabelTable,
    rule_index: usize,
) -> Result<CfgRule> {
    let header = cur.tokens("cfg rule header")?;
    if header.len() != 5 {
        return Err(ShrgError::MalformedGrammar {
            rule_index,
            reason: "expected `<shrg_index> <count> <total> <label> <num_items>`".to_string(),
        });
    }
    let shrg_index: usize = header[0].parse().map_err(|_| ShrgError::MalformedGrammar {
        rule_index,
        reason: "bad shrg_index".to_string(),
    })?;
    let count: f64 = header[1].parse().map_err(|_| ShrgError::MalformedGrammar {
        rule_index,
        reason: "bad count".to_string(),
    })?;
    let total: f64 = header[2].parse().map_err(|_| ShrgError::MalformedGrammar {
        rule_index,
        reason: "bad total".to_string(),
    })?;
    let label = labels.intern(header[3]);
    let num_items: usize = header[4].parse().map_err(|_| ShrgError::MalformedGrammar {
        rule_index,
        reason: "bad num_items".to_string(),
    })?;

    let score = count.ln() - total.ln();
    if score == f64::NEG_INFINITY {
        return Err(ShrgError::MalformedGrammar {
            rule_index,
            reason: "cfg rule score is -inf (count is zero)".to_string(),
        });
    }

    let mut items = Vec::with_capacity(num_items);
    for _ in 0..num_items {
        let toks = cur.tokens("cfg item")?;
        if toks.len() != 2 {
            return Err(ShrgError::MalformedGrammar {
                rule_index,
                reason: "expected `<item_label> <aligned_edge_idx|-1>`".to_string(),
            });
        }
        let aligned: i64 = parse_num(toks[1], "aligned_edge_idx")?;
        let item = if aligned < 0 {
            CfgItem::Literal(toks[0].to_string())
        } else {
            CfgItem::Aligned(EdgeIdx(aligned as u32))
        };
        items.push(item);
    }

    Ok(CfgRule {
        label,
        shrg_index,
        score,
        items,
    })
}

fn validate_shrg_indices(rules: &[ShrgRule], declared_rule_count: usize) -> Result<()> {
    let mut seen = vec![false; declared_rule_count.max(
        rules
            .iter()
            .flat_map(|r| r.cfg_rules.iter())
            .map(|c| c.shrg_index + 1)
            .max()
            .unwrap_or(0),
    )];
    for (rule_index, rule) in rules.iter().enumerate() {
        for cfg_rule in &rule.cfg_rules {
            if cfg_rule.shrg_index >= seen.len() || seen[cfg_rule.shrg_index] {
                return Err(ShrgError::MalformedGrammar {
                    rule_index,
                    reason: format!(
                        "shrg_index {} is out of range or duplicated",
                        cfg_rule.shrg_index
                    ),
                });
            }
            seen[cfg_rule.shrg_index] = true;
        }
    }
    if seen.iter().any(|&s| !s) {
        return Err(ShrgError::MalformedGrammar {
            rule_index: 0,
            reason: "shrg_index values are not dense over 0..n".to_string(),
        });
    }
    Ok(())
}
