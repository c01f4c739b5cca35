//! Cross-window message navigation with a jump-back history.

use std::sync::Arc;

use chat_core::{
    Begin, HistoryNavigationStack, Message, MessageId, MessageIndex, MessageWindow,
    SessionChannels, SessionError, SessionErrorCategory, SessionEvent, SideEffectSlot,
    SlotTicket, WindowOp,
};
use chat_platform::{HistoryWindow, MessageStore};
use tracing::{debug, info, warn};

use crate::{
    completion::{Completion, CompletionSender, forward},
    store::PresentationStateStore,
};

/// What the navigation lookup slot is resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKey {
    /// History window around a message outside the loaded window.
    Message(MessageId),
    /// First message at or after a date.
    Timestamp(u32),
}

#[derive(Debug)]
pub enum LookupOutcome {
    Window(HistoryWindow),
    Timestamp(Option<MessageId>),
}

pub struct MessageNavigator {
    window: MessageWindow,
    history: HistoryNavigationStack,
    lookup: SideEffectSlot<LookupKey, LookupOutcome>,
    /// Position the reader was at when the outstanding lookup started.
    lookup_origin: Option<MessageIndex>,
    fetch_count: usize,
    messages: Arc<dyn MessageStore>,
    completions: CompletionSender,
    channels: SessionChannels,
}

impl MessageNavigator {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        window_max_items: usize,
        history_fetch_count: usize,
        completions: CompletionSender,
        channels: SessionChannels,
    ) -> Self {
        Self {
            window: MessageWindow::new(window_max_items),
            history: HistoryNavigationStack::default(),
            lookup: SideEffectSlot::new("message_lookup"),
            lookup_origin: None,
            fetch_count: MessageWindow::bounded_fetch_count(history_fetch_count, window_max_items),
            messages,
            completions,
            channels,
        }
    }

    pub fn window(&self) -> &MessageWindow {
        &self.window
    }

    pub fn history(&self) -> &HistoryNavigationStack {
        &self.history
    }

    pub fn navigate_to_message(
        &mut self,
        store: &mut PresentationStateStore,
        from: Option<MessageId>,
        to: MessageId,
        remember_in_stack: bool,
    ) {
        if to.peer_id != store.current().peer_id {
            info!(target_message = ?to, "navigation target is in another conversation");
            self.cancel_lookup(store);
            self.channels
                .emit(SessionEvent::OpenConversation { message_id: to });
            return;
        }

        let from_index = from.and_then(|id| self.window.index_of(id));
        if remember_in_stack && let Some(index) = from_index {
            self.history.push(index);
        }
        let origin = from_index.or(self.window.anchor());

        if let Some(to_index) = self.window.index_of(to) {
            self.cancel_lookup(store);
            self.channels.emit(SessionEvent::ScrollToMessage {
                from: origin,
                to: to_index,
            });
            return;
        }

        debug!(target_message = ?to, count = self.fetch_count, "target outside loaded window");
        self.set_loading(store, true);
        let messages = Arc::clone(&self.messages);
        let count = self.fetch_count;
        let begin = self.lookup.begin(
            LookupKey::Message(to),
            move |_| messages.history_window(to, count).map(LookupOutcome::Window),
            forward(self.completions.clone(), |ticket, outcome| {
                Completion::Lookup { ticket, outcome }
            }),
        );
        self.lookup_origin = origin;
        if let Begin::Immediate(outcome) = begin {
            self.finish_lookup(store, outcome);
        }
    }

    /// Navigate to the first message at or after `timestamp`.
    pub fn jump_to_date(&mut self, store: &mut PresentationStateStore, timestamp: u32) {
        self.set_loading(store, true);
        let messages = Arc::clone(&self.messages);
        let peer_id = store.current().peer_id;
        let begin = self.lookup.begin(
            LookupKey::Timestamp(timestamp),
            move |_| {
                messages
                    .message_at(peer_id, timestamp)
                    .map(LookupOutcome::Timestamp)
            },
            forward(self.completions.clone(), |ticket, outcome| {
                Completion::Lookup { ticket, outcome }
            }),
        );
        self.lookup_origin = self.window.anchor();
        if let Begin::Immediate(outcome) = begin {
            self.finish_lookup(store, outcome);
        }
    }

    pub fn complete_lookup(
        &mut self,
        store: &mut PresentationStateStore,
        ticket: SlotTicket,
        outcome: LookupOutcome,
    ) {
        if self.lookup.accept(ticket) {
            self.finish_lookup(store, outcome);
        }
    }

    /// Return to the last remembered position, or to the latest message.
    pub fn navigate_back(&mut self, store: &mut PresentationStateStore) {
        match self.history.pop_last() {
            Some(index) => {
                debug!(position = ?index, remaining = self.history.len(), "jumping back");
                self.navigate_to_message(store, None, index.id, false);
            }
            None => {
                self.channels.emit(SessionEvent::ScrollToLatest);
            }
        }
    }

    /// Record the reader's position; history entries already scrolled past are dropped.
    pub fn update_viewport(&mut self, anchor: MessageIndex, max_visible: MessageIndex) {
        self.window.set_anchor(Some(anchor));
        self.history.prune_below(max_visible);
    }

    pub fn apply_window_ops(&mut self, ops: &[WindowOp]) -> Result<(), SessionError> {
        self.window.apply_ops(ops).map_err(|err| {
            warn!(%err, "window update rejected");
            SessionError::new(
                SessionErrorCategory::NotFound,
                "window_message_missing",
                err.to_string(),
            )
        })
    }

    pub fn replace_window(&mut self, messages: Vec<Message>) {
        self.window.replace(messages);
    }

    pub fn shutdown(&mut self) {
        self.lookup.cancel();
        self.lookup_origin = None;
    }

    fn finish_lookup(&mut self, store: &mut PresentationStateStore, outcome: LookupOutcome) {
        let origin = self.lookup_origin.take();
        self.set_loading(store, false);

        match (self.lookup.key().copied(), outcome) {
            (
                Some(LookupKey::Message(target)),
                LookupOutcome::Window(HistoryWindow::Loaded(messages)),
            ) => {
                let Some(to) = messages
                    .iter()
                    .find(|message| message.id == target)
                    .map(Message::index)
                else {
                    debug!(target_message = ?target, "target missing from fetched window");
                    return;
                };
                self.window.replace(messages);
                self.window.set_anchor(Some(to));
                self.channels
                    .emit(SessionEvent::ScrollToMessage { from: origin, to });
            }
            (Some(LookupKey::Message(target)), LookupOutcome::Window(HistoryWindow::Loading)) => {
                debug!(target_message = ?target, "history still loading; navigation dropped");
            }
            (Some(LookupKey::Timestamp(timestamp)), LookupOutcome::Timestamp(Some(id))) => {
                debug!(timestamp, message = ?id, "date resolved to message");
                self.navigate_to_message(store, None, id, false);
            }
            (Some(LookupKey::Timestamp(timestamp)), LookupOutcome::Timestamp(None)) => {
                debug!(timestamp, "no message at or after date");
            }
            (key, outcome) => warn!(?key, ?outcome, "lookup outcome does not match its key"),
        }
    }

    fn cancel_lookup(&mut self, store: &mut PresentationStateStore) {
        self.lookup.cancel();
        self.lookup_origin = None;
        self.set_loading(store, false);
    }

    fn set_loading(&self, store: &mut PresentationStateStore, loading: bool) {
        if store.current().is_loading_message != loading {
            store.apply(|state| state.with_loading_message(loading));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chat_core::{
        ContextQuery, ContextQueryResult, EventStream, LinkPreview, PeerId, PresentationState,
    };
    use chat_platform::{CachedResolver, InMemoryMessageStore};
    use tokio::{sync::mpsc, time::timeout};

    use super::*;

    fn id(n: i32) -> MessageId {
        MessageId::new(PeerId(1), n)
    }

    fn message(n: i32) -> Message {
        Message {
            id: id(n),
            timestamp: n as u32 * 100,
            author_id: None,
            text: format!("message {n}"),
            stable_version: 0,
        }
    }

    struct Harness {
        store: PresentationStateStore,
        navigator: MessageNavigator,
        messages: InMemoryMessageStore,
        completions: mpsc::UnboundedReceiver<Completion>,
        events: EventStream,
    }

    /// Store holds messages 1..=100; the window holds 90..=100.
    fn harness() -> Harness {
        let messages = InMemoryMessageStore::default();
        for n in 1..=100 {
            messages.insert(message(n));
        }
        let channels = SessionChannels::new(128);
        let events = channels.subscribe();
        let (tx, completions) = mpsc::unbounded_channel();
        let store = PresentationStateStore::new(
            PresentationState::new(PeerId(1)),
            Arc::new(CachedResolver::<ContextQuery, ContextQueryResult>::new(Duration::ZERO)),
            Arc::new(CachedResolver::<String, LinkPreview>::new(Duration::ZERO)),
            tx.clone(),
            channels.clone(),
        );
        let mut navigator = MessageNavigator::new(Arc::new(messages.clone()), 200, 20, tx, channels);
        navigator.replace_window((90..=100).map(message).collect());
        navigator.update_viewport(message(100).index(), message(100).index());
        Harness {
            store,
            navigator,
            messages,
            completions,
            events,
        }
    }

    fn scrolls(events: &mut EventStream) -> Vec<SessionEvent> {
        let mut found = Vec::new();
        while let Ok(event) = events.try_recv() {
            if !matches!(event, SessionEvent::StateUpdated(_)) {
                found.push(event);
            }
        }
        found
    }

    #[tokio::test]
    async fn in_window_target_scrolls_and_remembers_origin() {
        let mut h = harness();

        h.navigator
            .navigate_to_message(&mut h.store, Some(id(99)), id(92), true);

        assert_eq!(
            scrolls(&mut h.events),
            vec![SessionEvent::ScrollToMessage {
                from: Some(message(99).index()),
                to: message(92).index(),
            }]
        );
        assert_eq!(h.navigator.history().len(), 1);
        assert!(!h.store.current().is_loading_message);
    }

    #[tokio::test]
    async fn out_of_window_target_loads_history_first() {
        let mut h = harness();

        h.navigator
            .navigate_to_message(&mut h.store, Some(id(95)), id(10), true);

        assert!(h.navigator.window().message(id(10)).is_some());
        assert!(!h.store.current().is_loading_message);
        assert_eq!(
            scrolls(&mut h.events),
            vec![SessionEvent::ScrollToMessage {
                from: Some(message(95).index()),
                to: message(10).index(),
            }]
        );
    }

    #[tokio::test]
    async fn deferred_history_marks_loading_until_delivered() {
        let mut h = harness();
        h.messages.set_latency(Some(Duration::from_millis(5)));

        h.navigator
            .navigate_to_message(&mut h.store, None, id(30), false);
        assert!(h.store.current().is_loading_message);

        let completion = timeout(Duration::from_secs(2), h.completions.recv())
            .await
            .expect("lookup should not time out")
            .expect("completion channel should stay open");
        let Completion::Lookup { ticket, outcome } = completion else {
            panic!("expected lookup completion");
        };
        h.navigator.complete_lookup(&mut h.store, ticket, outcome);

        assert!(!h.store.current().is_loading_message);
        assert!(h.navigator.window().message(id(30)).is_some());
    }

    #[tokio::test]
    async fn newer_navigation_cancels_outstanding_lookup() {
        let mut h = harness();
        h.messages.set_latency(Some(Duration::from_millis(5)));

        h.navigator
            .navigate_to_message(&mut h.store, None, id(30), false);
        h.navigator
            .navigate_to_message(&mut h.store, None, id(97), false);

        assert!(!h.store.current().is_loading_message);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(h.completions.try_recv().is_err());
        assert!(h.navigator.window().message(id(30)).is_none());
    }

    #[tokio::test]
    async fn still_loading_history_clears_indicator_without_scrolling() {
        let mut h = harness();
        h.messages.set_history_loading(true);

        h.navigator
            .navigate_to_message(&mut h.store, None, id(30), false);

        assert!(!h.store.current().is_loading_message);
        assert!(scrolls(&mut h.events).is_empty());
    }

    #[tokio::test]
    async fn other_conversation_is_opened_instead() {
        let mut h = harness();
        let elsewhere = MessageId::new(PeerId(8), 3);

        h.navigator
            .navigate_to_message(&mut h.store, Some(id(99)), elsewhere, true);

        assert_eq!(
            scrolls(&mut h.events),
            vec![SessionEvent::OpenConversation {
                message_id: elsewhere
            }]
        );
        assert!(h.navigator.history().is_empty());
    }

    #[tokio::test]
    async fn back_pops_history_then_falls_back_to_latest() {
        let mut h = harness();
        h.navigator
            .navigate_to_message(&mut h.store, Some(id(99)), id(92), true);
        scrolls(&mut h.events);

        h.navigator.navigate_back(&mut h.store);
        assert_eq!(
            scrolls(&mut h.events),
            vec![SessionEvent::ScrollToMessage {
                from: Some(message(100).index()),
                to: message(99).index(),
            }]
        );

        h.navigator.navigate_back(&mut h.store);
        assert_eq!(scrolls(&mut h.events), vec![SessionEvent::ScrollToLatest]);
    }

    #[tokio::test]
    async fn viewport_prunes_passed_history_entries() {
        let mut h = harness();
        h.navigator
            .navigate_to_message(&mut h.store, Some(id(93)), id(91), true);
        assert_eq!(h.navigator.history().len(), 1);

        h.navigator
            .update_viewport(message(94).index(), message(95).index());
        assert!(h.navigator.history().is_empty());
    }

    #[tokio::test]
    async fn jump_to_date_navigates_to_first_message_on_that_day() {
        let mut h = harness();

        h.navigator.jump_to_date(&mut h.store, 4_050);

        assert!(h.navigator.window().message(id(41)).is_some());
        let events = scrolls(&mut h.events);
        assert!(matches!(
            events.as_slice(),
            [SessionEvent::ScrollToMessage { to, .. }] if *to == message(41).index()
        ));
    }

    #[tokio::test]
    async fn fetched_window_without_target_keeps_current_window() {
        let mut h = harness();
        h.messages.set_latency(Some(Duration::from_millis(5)));

        h.navigator
            .navigate_to_message(&mut h.store, Some(id(95)), id(30), true);
        assert!(h.store.current().is_loading_message);

        let completion = timeout(Duration::from_secs(2), h.completions.recv())
            .await
            .expect("lookup should not time out")
            .expect("completion channel should stay open");
        let Completion::Lookup { ticket, .. } = completion else {
            panic!("expected lookup completion");
        };
        let unrelated = (20..=25).map(message).collect();
        h.navigator.complete_lookup(
            &mut h.store,
            ticket,
            LookupOutcome::Window(HistoryWindow::Loaded(unrelated)),
        );

        assert!(!h.store.current().is_loading_message);
        assert!(scrolls(&mut h.events).is_empty());
        assert!(h.navigator.window().message(id(20)).is_none());
        assert!(h.navigator.window().message(id(95)).is_some());
    }

    #[tokio::test]
    async fn jump_past_last_message_clears_loading_without_scrolling() {
        let mut h = harness();

        h.navigator.jump_to_date(&mut h.store, 50_000);

        assert!(!h.store.current().is_loading_message);
        assert!(scrolls(&mut h.events).is_empty());
        assert!(h.navigator.window().message(id(100)).is_some());
    }

    #[tokio::test]
    async fn window_ops_report_missing_messages() {
        let mut h = harness();
        let err = h
            .navigator
            .apply_window_ops(&[WindowOp::Remove(id(5))])
            .expect_err("message 5 is not loaded");
        assert_eq!(err.code, "window_message_missing");

        h.navigator
            .apply_window_ops(&[WindowOp::Insert(message(101))])
            .expect("insert should work");
        assert!(h.navigator.window().message(id(101)).is_some());
    }
}
