//! The grammar as a whole: rules, their pre-indexes and decomposition
//! trees, and the label table shared with every graph parsed against it.
//! Ported from `synchronous_hyperedge_replacement_grammar.cpp`'s
//! top-level `SHRG::Load`.

pub mod decomposition;
pub mod parse_text;
pub mod preindex;
pub mod rule;

use std::collections::HashMap;

use crate::error::Result;
use crate::label::{Label, LabelTable};

use decomposition::{decompose, DecompNode, DecompositionStrategy};
use preindex::RulePreIndex;
pub use rule::{CfgItem, CfgRule, ShrgRule};

/// A loaded grammar: dense rule list plus everything the parser needs
/// pre-computed per rule (spec §4.1).
#[derive(Debug, Clone)]
pub struct Grammar {
    pub labels: LabelTable,
    pub rules: Vec<ShrgRule>,
    pub preindex: Vec<RulePreIndex>,
    pub decompositions: Vec<Option<DecompNode>>,
    /// Rule indices grouped by LHS label, for the EM M-step's per-LHS
    /// normalisation (spec §4.4) and for the parser's by-label lookups.
    lhs_groups: HashMap<Label, Vec<usize>>,
}

impl Grammar {
    /// Loads a grammar from the text format of spec §6.1, with a fresh
    /// `LabelTable` (shared afterwards with every graph parsed against
    /// this grammar, via `labels_mut`).
    pub fn load_from_str(input: &str) -> Result<Grammar> {
        let mut labels = LabelTable::new();
        let mut rules = parse_text::parse_rules(input, &mut labels)?;

        let mut preindex = Vec::with_capacity(rules.len());
        let mut decompositions = Vec::with_capacity(rules.len());
        for (rule_index, rule) in rules.iter_mut().enumerate() {
            preindex.push(preindex::build(rule_index, rule)?);
        }
        // decomposition runs after pre-indexing since it depends on the
        // final (DFS/free-count sorted) terminal_edges / non_terminal_edges
        // order preindex::build installs.
        for rule in &rules {
            decompositions.push(decompose(rule, DecompositionStrategy::MinimumWidth));
        }

        let mut lhs_groups: HashMap<Label, Vec<usize>> = HashMap::new();
        for (i, rule) in rules.iter().enumerate() {
            lhs_groups.entry(rule.label).or_default().push(i);
        }

        Ok(Grammar {
            labels,
            rules,
            preindex,
            decompositions,
            lhs_groups,
        })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn rules_with_label(&self, label: Label) -> &[usize] {
        self.lhs_groups.get(&label).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every distinct LHS label appearing in the grammar.
    pub fn lhs_labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.lhs_groups.keys().copied()
    }

    /// Total number of `CfgRule`s across the whole grammar — the
    /// dimensionality of the EM weight vector (spec §6.3).
    pub fn cfg_rule_count(&self) -> usize {
        self.rules.iter().map(|r| r.cfg_rules.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_grammar_and_groups_by_label() {
        let input = "\
1
1
1 1
A 1 0 Y
1 0
1
0 1 1 S 1
a -1
";
        let grammar = Grammar::load_from_str(input).unwrap();
        assert_eq!(grammar.rule_count(), 1);
        assert_eq!(grammar.preindex.len(), 1);
        assert_eq!(grammar.decompositions.len(), 1);
        let s = grammar.labels.lookup("S").unwrap();
        assert_eq!(grammar.rules_with_label(s).len(), 1);
    }
}
