//! Weight-history CSV (spec §6.3): one rule per line,
//! `<shrg_index>,<log_w_iter0>,<log_w_iter1>,...`. Tolerant of
//! `inf`/`-inf`/`nan`, a Unicode minus, and CR/LF line endings via
//! `numeric::parse_weight_token`. Ported from `em_utils.hpp`'s
//! `writeHistoryToFile`/`load_weights`.

use std::path::Path;

use crate::error::{Result, ShrgError};
use crate::numeric::parse_weight_token;

/// Parses a weight-history CSV's full text into `history[shrg_index][iteration]`.
/// Rows need not be in `shrg_index` order; the result is indexed densely
/// from 0 to the maximum `shrg_index` seen, with any unmentioned index
/// left as an empty row.
pub fn parse_weight_history(text: &str) -> Result<Vec<Vec<f64>>> {
    let mut rows: Vec<(usize, Vec<f64>)> = Vec::new();
    let mut max_index = 0usize;

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        let mut parts = line.split(',');
        let index_tok = parts.next().ok_or_else(|| ShrgError::ParseFormat {
            location: format!("weight-history file, line {line_no}"),
            reason: "missing shrg_index column".to_string(),
        })?;
        let shrg_index: usize = index_tok.trim().parse().map_err(|_| ShrgError::ParseFormat {
            location: format!("weight-history file, line {line_no}"),
            reason: format!("couldn't parse shrg_index from {index_tok:?}"),
        })?;
        max_index = max_index.max(shrg_index);
        let weights: Vec<f64> = parts.map(parse_weight_token).collect();
        rows.push((shrg_index, weights));
    }

    let mut out = vec![Vec::new(); max_index + 1];
    for (index, weights) in rows {
        out[index] = weights;
    }
    Ok(out)
}

/// Loads a weight-history CSV from disk.
pub fn load_weight_history(path: impl AsRef<Path>) -> Result<Vec<Vec<f64>>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| ShrgError::from(e).with_context(format!("reading weight-history file {}", path.display())))?;
    parse_weight_history(&text)
}

/// Renders `history[shrg_index][iteration]` as spec §6.3 text.
pub fn format_weight_history(history: &[Vec<f64>]) -> String {
    let mut out = String::new();
    for (shrg_index, weights) in history.iter().enumerate() {
        out.push_str(&shrg_index.to_string());
        for w in weights {
            out.push(',');
            out.push_str(&format_weight(*w));
        }
        out.push('\n');
    }
    out
}

fn format_weight(w: f64) -> String {
    if w.is_nan() {
        "nan".to_string()
    } else if w == f64::INFINITY {
        "inf".to_string()
    } else if w == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        w.to_string()
    }
}

/// Writes `history` to `path` in spec §6.3 text format.
pub fn write_weight_history(path: impl AsRef<Path>, history: &[Vec<f64>]) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, format_weight_history(history))
        .map_err(|e| ShrgError::from(e).with_context(format!("writing weight-history file {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tolerant_tokens_across_iterations() {
        let text = "0,-1.5,-1.2,-1.0\r\n1,-0.5,\u{2212}0.3,inf\n";
        let history = parse_weight_history(text).unwrap();
        assert_eq!(history[0], vec![-1.5, -1.2, -1.0]);
        assert_eq!(history[1][1], -0.3);
        assert_eq!(history[1][2], f64::INFINITY);
    }

    #[test]
    fn round_trips_finite_weights() {
        let history = vec![vec![0.0, -1.0], vec![-2.0, -3.0]];
        let text = format_weight_history(&history);
        let parsed = parse_weight_history(&text).unwrap();
        assert_eq!(parsed, history);
    }

    #[test]
    fn rejects_missing_index_column() {
        assert!(parse_weight_history(",-1.0\n").is_err());
    }
}
