//! File-format I/O (spec §6): grammar/graph file parsing is re-exported
//! from where the respective data model already lives (`grammar::parse_text`,
//! `eds`); this module adds the two formats that don't have a natural
//! home in a data-model module — weight-history CSV and derivation text
//! output.

pub mod derivation_file;
pub mod weight_history;

use std::path::Path;

use crate::eds::EdsGraph;
use crate::error::{Result, ShrgError};
use crate::grammar::Grammar;
use crate::label::LabelTable;

/// Loads a grammar from a spec §6.1 text file.
pub fn load_grammar_file(path: impl AsRef<Path>) -> Result<Grammar> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| ShrgError::from(e).with_context(format!("reading grammar file {}", path.display())))?;
    Grammar::load_from_str(&text)
}

/// Loads a corpus of graphs from a spec §6.2 text file, interning
/// labels into `labels` (normally the grammar's own `LabelTable`, so
/// graph and grammar labels share one id space).
pub fn load_graph_file(path: impl AsRef<Path>, labels: &mut LabelTable) -> Result<Vec<EdsGraph>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| ShrgError::from(e).with_context(format!("reading graph file {}", path.display())))?;
    crate::eds::parse_graph_file(&text, labels)
}
