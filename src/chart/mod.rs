//! Packed derivation-forest chart: arena, OR-node dedup, and the
//! bottom-up work-list that fills it. See spec §3.2 and §4.3; realised
//! as an index-based arena rather than the original's pointer graph
//! (spec §9).

pub mod agenda;
pub mod item;
pub mod pool;

pub use agenda::{Agenda, LabelKey};
pub use item::{AndNode, AndNodeId, EdgeSet, NodeMapping, UNBOUND};
pub use pool::Pool;

/// A filled chart: the AND-node pool plus the label-indexed view of its
/// completed entries, handed from the parser to the forest/EM stages.
pub struct Chart {
    pub pool: Pool,
    pub agenda: Agenda,
}

impl Chart {
    pub fn new(capacity: usize) -> Self {
        Self {
            pool: Pool::new(capacity),
            agenda: Agenda::new(),
        }
    }
}
