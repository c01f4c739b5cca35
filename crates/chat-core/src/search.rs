use serde::{Deserialize, Serialize};

use crate::types::MessageId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SearchDirection {
    Earlier,
    Later,
}

/// Matches for one query, ascending, with a cursor on the focused match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResults {
    message_ids: Vec<MessageId>,
    current: Option<usize>,
}

impl SearchResults {
    /// Sort and dedupe `matches`, then carry the cursor forward.
    ///
    /// The cursor lands on the first match at or after `previous_current`,
    /// or on the last match when nothing qualifies.
    pub fn new(mut matches: Vec<MessageId>, previous_current: Option<MessageId>) -> Self {
        matches.sort();
        matches.dedup();
        let current = if matches.is_empty() {
            None
        } else {
            previous_current
                .and_then(|previous| matches.iter().position(|id| *id >= previous))
                .or(Some(matches.len() - 1))
        };
        Self {
            message_ids: matches,
            current,
        }
    }

    pub fn message_ids(&self) -> &[MessageId] {
        &self.message_ids
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_id(&self) -> Option<MessageId> {
        self.current.map(|index| self.message_ids[index])
    }

    /// Results with the cursor moved one step, or `None` at the bound.
    pub fn navigated(&self, direction: SearchDirection) -> Option<Self> {
        let current = self.current?;
        let next = match direction {
            SearchDirection::Earlier => current.checked_sub(1)?,
            SearchDirection::Later if current + 1 < self.message_ids.len() => current + 1,
            SearchDirection::Later => return None,
        };
        Some(Self {
            message_ids: self.message_ids.clone(),
            current: Some(next),
        })
    }
}

/// In-chat search sub-state of the presentation snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchState {
    pub query: String,
    pub results: Option<SearchResults>,
    /// A search request for `query` is outstanding.
    pub is_searching: bool,
}

impl SearchState {
    /// Store fresh matches for the current query; returns the focused id.
    pub fn absorb_matches(&mut self, matches: Vec<MessageId>) -> Option<MessageId> {
        let previous = self.results.as_ref().and_then(SearchResults::current_id);
        let results = SearchResults::new(matches, previous);
        let focused = results.current_id();
        self.results = Some(results);
        self.is_searching = false;
        focused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PeerId;

    fn id(n: i32) -> MessageId {
        MessageId::new(PeerId(2), n)
    }

    fn ids(ns: &[i32]) -> Vec<MessageId> {
        ns.iter().copied().map(id).collect()
    }

    #[test]
    fn sorts_matches_and_defaults_to_last() {
        let results = SearchResults::new(ids(&[30, 10, 20, 10]), None);
        assert_eq!(results.message_ids(), ids(&[10, 20, 30]).as_slice());
        assert_eq!(results.current_id(), Some(id(30)));
    }

    #[test]
    fn carries_cursor_forward_to_first_match_at_or_after_previous() {
        let results = SearchResults::new(ids(&[5, 15, 25]), Some(id(12)));
        assert_eq!(results.current_id(), Some(id(15)));

        let exact = SearchResults::new(ids(&[5, 15, 25]), Some(id(15)));
        assert_eq!(exact.current_id(), Some(id(15)));

        let past_end = SearchResults::new(ids(&[5, 15, 25]), Some(id(40)));
        assert_eq!(past_end.current_id(), Some(id(25)));
    }

    #[test]
    fn empty_matches_have_no_cursor() {
        let results = SearchResults::new(Vec::new(), Some(id(1)));
        assert_eq!(results.current_id(), None);
        assert!(results.navigated(SearchDirection::Earlier).is_none());
    }

    #[test]
    fn navigation_clamps_without_wraparound() {
        let results = SearchResults::new(ids(&[1, 2, 3]), Some(id(1)));
        assert_eq!(results.current_index(), Some(0));
        assert!(results.navigated(SearchDirection::Earlier).is_none());

        let later = results
            .navigated(SearchDirection::Later)
            .and_then(|results| results.navigated(SearchDirection::Later))
            .expect("two steps later should be in bounds");
        assert_eq!(later.current_id(), Some(id(3)));
        assert!(later.navigated(SearchDirection::Later).is_none());
        assert_eq!(later.message_ids(), results.message_ids());
    }

    #[test]
    fn absorb_uses_previous_cursor() {
        let mut search = SearchState {
            query: "a".into(),
            results: Some(SearchResults::new(ids(&[4, 8]), Some(id(8)))),
            is_searching: true,
        };
        search.query = "ab".into();
        let focused = search.absorb_matches(ids(&[2, 9, 12]));
        assert_eq!(focused, Some(id(9)));
        assert!(!search.is_searching);
    }
}
