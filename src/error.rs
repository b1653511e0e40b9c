//! Typed error surface, one variant per row of the error table: grammar
//! load failures are fatal, everything else is recoverable per-graph.

use thiserror::Error;

/// Errors the core can raise. See spec §7 for the recovery semantics of
/// each variant; `run_em` and the parser callers are responsible for
/// treating `OutOfMemory`/`NoResult`/`NotRepresentable` as per-graph
/// failures rather than aborting the whole run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ShrgError {
    /// Raised by the grammar pre-index at load time. Fatal: the caller
    /// should not attempt to parse with a malformed grammar.
    #[error("malformed grammar (rule {rule_index}): {reason}")]
    MalformedGrammar { rule_index: usize, reason: String },

    /// Raised by parser initialisation when the input graph exceeds the
    /// 256-edge/256-node bound. Recoverable: skip the graph.
    #[error("graph {graph_id:?} too large: {edges} edges, {nodes} nodes (limit 256/256)")]
    TooLarge {
        graph_id: Option<String>,
        edges: usize,
        nodes: usize,
    },

    /// Raised when the chart's arena exceeds its configured pool size.
    /// The parser drains its queues and returns; the caller may skip
    /// the graph or retry with a larger pool.
    #[error("chart item pool exhausted (capacity {capacity})")]
    OutOfMemory { capacity: usize },

    /// Raised at parser finalisation when no passive item covers the
    /// full input edge-set with the requested root arity.
    #[error("no parse covering the full input for graph {graph_id:?}")]
    NoResult { graph_id: Option<String> },

    /// Raised by the EM M-step when a numerically degenerate weight
    /// (inf/NaN, not sanitised away as a zero-count) is produced.
    /// Fatal: aborts the enclosing `run_em` call.
    #[error("degenerate rule weight for rule {shrg_index} at iteration {iteration}")]
    DegenerateCount { shrg_index: usize, iteration: usize },

    /// Raised by gold-derivation alignment when the forest cannot
    /// realise the requested multiset of rule indices. Recoverable:
    /// reported per graph, omitted from the gold map.
    #[error("gold derivation not representable in forest for graph {graph_id:?}")]
    NotRepresentable { graph_id: Option<String> },

    /// I/O or text-format errors from the §6 file readers/writers.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: IoErrorWrapper,
    },

    /// Malformed text in one of the §6 file formats that isn't an I/O
    /// failure (e.g. a grammar file with a truncated rule count).
    #[error("malformed input at {location}: {reason}")]
    ParseFormat { location: String, reason: String },
}

/// `std::io::Error` isn't `Clone`/`PartialEq`, which the rest of this
/// crate's error type wants for easy testing; wrap its rendered message
/// instead of the error itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoErrorWrapper(pub String);

impl std::fmt::Display for IoErrorWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoErrorWrapper {}

impl From<std::io::Error> for ShrgError {
    fn from(e: std::io::Error) -> Self {
        ShrgError::Io {
            context: "i/o".to_string(),
            source: IoErrorWrapper(e.to_string()),
        }
    }
}

impl ShrgError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        match self {
            ShrgError::Io { source, .. } => ShrgError::Io {
                context: context.into(),
                source,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShrgError>;
