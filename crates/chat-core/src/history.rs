use tracing::trace;

use crate::types::MessageIndex;

/// Positions the user jumped away from, newest on top.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryNavigationStack {
    entries: Vec<MessageIndex>,
}

impl HistoryNavigationStack {
    /// Push `position` unless it already is the top entry.
    pub fn push(&mut self, position: MessageIndex) {
        if self.entries.last() == Some(&position) {
            return;
        }
        trace!(?position, depth = self.entries.len() + 1, "pushed history position");
        self.entries.push(position);
    }

    pub fn pop_last(&mut self) -> Option<MessageIndex> {
        self.entries.pop()
    }

    /// Drop every entry at or below `position`; the reader already passed them.
    pub fn prune_below(&mut self, position: MessageIndex) {
        let before = self.entries.len();
        self.entries.retain(|entry| *entry > position);
        if self.entries.len() != before {
            trace!(
                ?position,
                pruned = before - self.entries.len(),
                "pruned history positions"
            );
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
