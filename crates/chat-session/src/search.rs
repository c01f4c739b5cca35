use std::sync::Arc;

use chat_core::{
    Begin, MessageId, SearchDirection, SearchState, SideEffectSlot, SlotTicket, TitlePanelKind,
};
use chat_platform::MessageStore;
use tracing::{debug, trace};

use crate::{
    completion::{Completion, CompletionSender, forward},
    store::PresentationStateStore,
};

/// In-chat search: query slot, result cursor and the focused match.
///
/// Operations that move the focus return the message the caller should
/// navigate to.
pub struct SearchSession {
    slot: SideEffectSlot<String, Vec<MessageId>>,
    messages: Arc<dyn MessageStore>,
    completions: CompletionSender,
}

impl SearchSession {
    pub fn new(messages: Arc<dyn MessageStore>, completions: CompletionSender) -> Self {
        Self {
            slot: SideEffectSlot::new("search"),
            messages,
            completions,
        }
    }

    pub fn begin(&mut self, store: &mut PresentationStateStore) {
        store.apply(|state| {
            let search = state.search.clone().unwrap_or_default();
            state
                .with_title_panel_contexts(|contexts| contexts.remove_kind(TitlePanelKind::ChatInfo))
                .with_search(Some(search))
        });
    }

    pub fn dismiss(&mut self, store: &mut PresentationStateStore) {
        self.slot.cancel();
        store.apply(|state| state.with_search(None));
    }

    pub fn update_query(
        &mut self,
        store: &mut PresentationStateStore,
        query: String,
    ) -> Option<MessageId> {
        let Some(search) = &store.current().search else {
            trace!("search inactive; query ignored");
            return None;
        };
        if search.query == query {
            trace!("search query unchanged");
            return None;
        }

        if query.is_empty() {
            self.slot.cancel();
            store.apply(|state| state.with_search(Some(SearchState::default())));
            return None;
        }

        let peer_id = store.current().peer_id;
        let messages = Arc::clone(&self.messages);
        let begin = self.slot.begin(
            query.clone(),
            move |query| messages.search(peer_id, query),
            forward(self.completions.clone(), |ticket, found| {
                Completion::Search { ticket, found }
            }),
        );

        let mut focused = None;
        store.apply(|state| {
            let mut search = state.search.clone().unwrap_or_default();
            search.query = query;
            match begin {
                Begin::Immediate(found) => focused = search.absorb_matches(found),
                Begin::Pending(_) => search.is_searching = true,
            }
            state.with_search(Some(search))
        });
        focused
    }

    /// Deliver deferred matches, unless a newer query superseded them.
    pub fn complete(
        &mut self,
        store: &mut PresentationStateStore,
        ticket: SlotTicket,
        found: Vec<MessageId>,
    ) -> Option<MessageId> {
        if !self.slot.accept(ticket) {
            return None;
        }
        debug!(matches = found.len(), "search resolved");
        let mut focused = None;
        store.apply(|state| {
            let mut search = state.search.clone().unwrap_or_default();
            focused = search.absorb_matches(found);
            state.with_search(Some(search))
        });
        focused
    }

    /// Move the cursor one match; `None` at either end of the results.
    pub fn navigate(
        &mut self,
        store: &mut PresentationStateStore,
        direction: SearchDirection,
    ) -> Option<MessageId> {
        let Some(next) = store
            .current()
            .search
            .as_ref()
            .and_then(|search| search.results.as_ref())
            .and_then(|results| results.navigated(direction))
        else {
            trace!(?direction, "search cursor at bound");
            return None;
        };
        let focused = next.current_id();
        store.apply(|state| {
            let mut search = state.search.clone().unwrap_or_default();
            search.results = Some(next);
            state.with_search(Some(search))
        });
        focused
    }

    pub fn shutdown(&mut self) {
        self.slot.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chat_core::{
        ContextQuery, ContextQueryResult, LinkPreview, Message, PeerId, PresentationState,
        SessionChannels, TitlePanelContext,
    };
    use chat_platform::{CachedResolver, InMemoryMessageStore};
    use tokio::{sync::mpsc, time::timeout};

    use super::*;

    fn id(n: i32) -> MessageId {
        MessageId::new(PeerId(1), n)
    }

    fn seeded_store() -> InMemoryMessageStore {
        let messages = InMemoryMessageStore::default();
        for (n, text) in [(1, "invoice draft"), (2, "lunch?"), (3, "final invoice"), (4, "invoice paid")] {
            messages.insert(Message {
                id: id(n),
                timestamp: n as u32 * 60,
                author_id: None,
                text: text.to_owned(),
                stable_version: 0,
            });
        }
        messages
    }

    fn setup(
        messages: InMemoryMessageStore,
    ) -> (
        PresentationStateStore,
        SearchSession,
        mpsc::UnboundedReceiver<Completion>,
    ) {
        let channels = SessionChannels::new(64);
        let (tx, rx) = mpsc::unbounded_channel();
        let store = PresentationStateStore::new(
            PresentationState::new(PeerId(1)),
            Arc::new(CachedResolver::<ContextQuery, ContextQueryResult>::new(Duration::ZERO)),
            Arc::new(CachedResolver::<String, LinkPreview>::new(Duration::ZERO)),
            tx.clone(),
            channels,
        );
        (store, SearchSession::new(Arc::new(messages), tx), rx)
    }

    #[tokio::test]
    async fn begin_hides_chat_info_and_opens_search() {
        let (mut store, mut search, _rx) = setup(seeded_store());
        store.apply(|state| {
            state.with_title_panel_contexts(|contexts| contexts.insert(TitlePanelContext::ChatInfo))
        });

        search.begin(&mut store);

        assert_eq!(store.current().search, Some(SearchState::default()));
        assert!(!store
            .current()
            .title_panel_contexts
            .contains_kind(TitlePanelKind::ChatInfo));
    }

    #[tokio::test]
    async fn immediate_matches_focus_latest_and_navigate() {
        let (mut store, mut search, _rx) = setup(seeded_store());
        search.begin(&mut store);

        let focused = search.update_query(&mut store, "invoice".into());
        assert_eq!(focused, Some(id(4)));

        assert_eq!(search.navigate(&mut store, SearchDirection::Earlier), Some(id(3)));
        assert_eq!(search.navigate(&mut store, SearchDirection::Earlier), Some(id(1)));
        assert_eq!(search.navigate(&mut store, SearchDirection::Earlier), None);
        assert_eq!(search.navigate(&mut store, SearchDirection::Later), Some(id(3)));

        let results = store
            .current()
            .search
            .as_ref()
            .and_then(|search| search.results.clone())
            .expect("results should be present");
        assert_eq!(results.current_id(), Some(id(3)));
    }

    #[tokio::test]
    async fn repeated_query_is_ignored_and_empty_query_clears() {
        let (mut store, mut search, _rx) = setup(seeded_store());
        search.begin(&mut store);
        search.update_query(&mut store, "invoice".into());

        assert_eq!(search.update_query(&mut store, "invoice".into()), None);

        search.update_query(&mut store, String::new());
        assert_eq!(store.current().search, Some(SearchState::default()));
    }

    #[tokio::test]
    async fn deferred_matches_arrive_through_completion() {
        let messages = seeded_store();
        messages.set_latency(Some(Duration::from_millis(5)));
        let (mut store, mut search, mut rx) = setup(messages);
        search.begin(&mut store);

        assert_eq!(search.update_query(&mut store, "lunch".into()), None);
        assert!(store
            .current()
            .search
            .as_ref()
            .is_some_and(|search| search.is_searching));

        let completion = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("search should not time out")
            .expect("completion channel should stay open");
        let Completion::Search { ticket, found } = completion else {
            panic!("expected search completion");
        };
        assert_eq!(search.complete(&mut store, ticket, found), Some(id(2)));
        assert!(store
            .current()
            .search
            .as_ref()
            .is_some_and(|search| !search.is_searching));
    }

    #[tokio::test]
    async fn superseded_query_never_applies_its_matches() {
        let messages = seeded_store();
        messages.set_latency(Some(Duration::from_millis(5)));
        let (mut store, mut search, mut rx) = setup(messages);
        search.begin(&mut store);

        assert_eq!(search.update_query(&mut store, "l".into()), None);
        assert_eq!(search.update_query(&mut store, "lunch".into()), None);

        let mut applied = Vec::new();
        while let Ok(Some(completion)) = timeout(Duration::from_millis(100), rx.recv()).await {
            let Completion::Search { ticket, found } = completion else {
                panic!("expected search completion");
            };
            if let Some(focused) = search.complete(&mut store, ticket, found) {
                applied.push(focused);
            }
        }

        assert_eq!(applied, vec![id(2)]);
        let current = store.current().search.clone().expect("search should stay open");
        assert_eq!(current.query, "lunch");
        assert!(!current.is_searching);
        let results = current.results.expect("results should be present");
        assert_eq!(results.message_ids(), &[id(2)]);
    }

    #[tokio::test]
    async fn query_is_ignored_while_search_is_closed() {
        let (mut store, mut search, mut rx) = setup(seeded_store());

        assert_eq!(search.update_query(&mut store, "invoice".into()), None);
        assert_eq!(store.current().search, None);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dismiss_cancels_outstanding_search() {
        let messages = seeded_store();
        messages.set_latency(Some(Duration::from_millis(5)));
        let (mut store, mut search, mut rx) = setup(messages);
        search.begin(&mut store);
        search.update_query(&mut store, "invoice".into());

        search.dismiss(&mut store);
        assert_eq!(store.current().search, None);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(rx.try_recv().is_err());
    }
}
