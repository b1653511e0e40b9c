//! Work-list driving the bottom-up chart fill (spec §4.3): completed
//! (passive) chart entries are filed under the label/arity/terminal-ness
//! hash of the edge they stand in for, so a rule waiting on that edge
//! can look candidates up directly — the same label-bucketed shape as
//! the teacher's own agenda-driven `earley.rs` state machine, minus its
//! flat FIFO since each parser engine (`parser::linear`, `parser::tree`)
//! already drives its own re-evaluation queue over this index.

use std::collections::HashMap;

use crate::label::LabelHash;

use super::item::AndNodeId;

/// Identifies a completed (passive) chart entry other rules can consume
/// as a non-terminal child: the label/arity/terminal-ness hash of the
/// edge it stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelKey(pub LabelHash);

#[derive(Default)]
struct Bucket {
    items: Vec<AndNodeId>,
}

/// The chart's label-indexed view of its completed entries.
pub struct Agenda {
    by_label: HashMap<LabelKey, Bucket>,
}

impl Agenda {
    pub fn new() -> Self {
        Self {
            by_label: HashMap::new(),
        }
    }

    pub fn file_completed(&mut self, key: LabelKey, item: AndNodeId) {
        self.by_label.entry(key).or_default().items.push(item);
    }

    pub fn completed(&self, key: &LabelKey) -> &[AndNodeId] {
        self.by_label.get(key).map(|b| b.items.as_slice()).unwrap_or(&[])
    }
}

impl Default for Agenda {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filed_items_accumulate_under_their_label_key() {
        let mut agenda = Agenda::new();
        let key = LabelKey(42);
        agenda.file_completed(key, AndNodeId(0));
        agenda.file_completed(key, AndNodeId(1));
        assert_eq!(agenda.completed(&key).len(), 2);

        agenda.file_completed(key, AndNodeId(2));
        assert_eq!(agenda.completed(&key).len(), 3);
        assert_eq!(agenda.completed(&LabelKey(7)).len(), 0);
    }
}
