//! Transient title panel contexts: toasts and message-button callbacks.

use std::{sync::Arc, time::Duration};

use chat_core::{
    Begin, MessageId, Resolution, SessionChannels, SessionEvent, SideEffectSlot, SlotTicket,
    TitlePanelContext, TitlePanelKind,
};
use chat_platform::{CallbackAnswer, MessageStore, PlatformError};
use tracing::{debug, warn};

use crate::{
    completion::{Completion, CompletionSender, forward, map_platform_error},
    store::PresentationStateStore,
};

pub struct TitlePanelAlerts {
    toast: SideEffectSlot<String, ()>,
    callback: SideEffectSlot<MessageId, Result<CallbackAnswer, PlatformError>>,
    toast_duration: Duration,
    messages: Arc<dyn MessageStore>,
    completions: CompletionSender,
    channels: SessionChannels,
}

impl TitlePanelAlerts {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        toast_duration: Duration,
        completions: CompletionSender,
        channels: SessionChannels,
    ) -> Self {
        Self {
            toast: SideEffectSlot::new("toast"),
            callback: SideEffectSlot::new("message_callback"),
            toast_duration,
            messages,
            completions,
            channels,
        }
    }

    /// Show `text` in the title panel; a newer toast replaces the current one.
    pub fn show_toast(&mut self, store: &mut PresentationStateStore, text: String) {
        store.apply(|state| {
            state.with_title_panel_contexts(|contexts| {
                contexts.insert(TitlePanelContext::ToastAlert(text.clone()))
            })
        });
        let duration = self.toast_duration;
        self.toast.begin(
            text,
            move |_| Resolution::pending(tokio::time::sleep(duration)),
            forward(self.completions.clone(), |ticket, ()| {
                Completion::ToastExpired { ticket }
            }),
        );
    }

    pub fn expire_toast(&mut self, store: &mut PresentationStateStore, ticket: SlotTicket) {
        if !self.toast.accept(ticket) {
            return;
        }
        debug!("toast expired");
        store.apply(|state| {
            state.with_title_panel_contexts(|contexts| {
                contexts.remove_kind(TitlePanelKind::ToastAlert)
            })
        });
    }

    /// Ask the bot behind an inline button for an answer.
    pub fn request_callback(
        &mut self,
        store: &mut PresentationStateStore,
        message_id: MessageId,
        data: Vec<u8>,
    ) {
        store.apply(|state| {
            state.with_title_panel_contexts(|contexts| {
                contexts.insert(TitlePanelContext::RequestInProgress)
            })
        });
        let messages = Arc::clone(&self.messages);
        let begin = self.callback.begin(
            message_id,
            move |message_id| messages.request_callback(*message_id, data),
            forward(self.completions.clone(), |ticket, answer| {
                Completion::Callback { ticket, answer }
            }),
        );
        if let Begin::Immediate(answer) = begin {
            self.finish_callback(store, answer);
        }
    }

    pub fn complete_callback(
        &mut self,
        store: &mut PresentationStateStore,
        ticket: SlotTicket,
        answer: Result<CallbackAnswer, PlatformError>,
    ) {
        if self.callback.accept(ticket) {
            self.finish_callback(store, answer);
        }
    }

    pub fn shutdown(&mut self) {
        self.toast.cancel();
        self.callback.cancel();
    }

    fn finish_callback(
        &mut self,
        store: &mut PresentationStateStore,
        answer: Result<CallbackAnswer, PlatformError>,
    ) {
        store.apply(|state| {
            state.with_title_panel_contexts(|contexts| {
                contexts.remove_kind(TitlePanelKind::RequestInProgress)
            })
        });
        match answer {
            Ok(CallbackAnswer::None) => {}
            Ok(CallbackAnswer::Toast(text)) => self.show_toast(store, text),
            Ok(CallbackAnswer::Alert(text)) => {
                self.channels.emit(SessionEvent::Alert { text });
            }
            Ok(CallbackAnswer::OpenUrl(url)) => {
                self.channels.emit(SessionEvent::OpenUrl { url });
            }
            Err(err) => {
                warn!(%err, "message callback failed");
                self.channels
                    .emit(SessionEvent::Error(map_platform_error("message_callback", err)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chat_core::{
        ContextQuery, ContextQueryResult, EventStream, LinkPreview, PeerId, PresentationState,
    };
    use chat_platform::{CachedResolver, InMemoryMessageStore};
    use tokio::{sync::mpsc, time::timeout};

    use super::*;

    struct Harness {
        store: PresentationStateStore,
        alerts: TitlePanelAlerts,
        messages: InMemoryMessageStore,
        completions: mpsc::UnboundedReceiver<Completion>,
        events: EventStream,
    }

    fn harness(toast_duration: Duration) -> Harness {
        let channels = SessionChannels::new(64);
        let events = channels.subscribe();
        let (tx, completions) = mpsc::unbounded_channel();
        let store = PresentationStateStore::new(
            PresentationState::new(PeerId(1)),
            Arc::new(CachedResolver::<ContextQuery, ContextQueryResult>::new(Duration::ZERO)),
            Arc::new(CachedResolver::<String, LinkPreview>::new(Duration::ZERO)),
            tx.clone(),
            channels.clone(),
        );
        let messages = InMemoryMessageStore::default();
        let alerts =
            TitlePanelAlerts::new(Arc::new(messages.clone()), toast_duration, tx, channels);
        Harness {
            store,
            alerts,
            messages,
            completions,
            events,
        }
    }

    async fn next_completion(h: &mut Harness) -> Completion {
        timeout(Duration::from_secs(2), h.completions.recv())
            .await
            .expect("completion should not time out")
            .expect("completion channel should stay open")
    }

    fn top(h: &Harness) -> Option<TitlePanelContext> {
        h.store.current().title_panel_contexts.top().cloned()
    }

    #[tokio::test]
    async fn toast_disappears_after_its_duration() {
        let mut h = harness(Duration::from_millis(5));

        h.alerts.show_toast(&mut h.store, "Copied".into());
        assert_eq!(top(&h), Some(TitlePanelContext::ToastAlert("Copied".into())));

        let Completion::ToastExpired { ticket } = next_completion(&mut h).await else {
            panic!("expected toast expiry");
        };
        h.alerts.expire_toast(&mut h.store, ticket);
        assert_eq!(top(&h), None);
    }

    #[tokio::test]
    async fn newer_toast_replaces_and_restarts_timer() {
        let mut h = harness(Duration::from_millis(20));

        h.alerts.show_toast(&mut h.store, "first".into());
        h.alerts.show_toast(&mut h.store, "second".into());
        assert_eq!(
            h.store.current().title_panel_contexts.as_slice(),
            &[TitlePanelContext::ToastAlert("second".into())]
        );

        let Completion::ToastExpired { ticket } = next_completion(&mut h).await else {
            panic!("expected toast expiry");
        };
        h.alerts.expire_toast(&mut h.store, ticket);
        assert_eq!(top(&h), None);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(h.completions.try_recv().is_err());
    }

    #[tokio::test]
    async fn callback_toast_answer_replaces_progress() {
        let mut h = harness(Duration::from_secs(60));
        let message_id = MessageId::new(PeerId(1), 12);
        h.messages
            .set_callback_answer(message_id, CallbackAnswer::Toast("Voted".into()));

        h.alerts.request_callback(&mut h.store, message_id, b"vote:1".to_vec());

        assert_eq!(
            h.store.current().title_panel_contexts.as_slice(),
            &[TitlePanelContext::ToastAlert("Voted".into())]
        );
    }

    #[tokio::test]
    async fn deferred_callback_shows_progress_until_answered() {
        let mut h = harness(Duration::from_secs(60));
        let message_id = MessageId::new(PeerId(1), 12);
        h.messages
            .set_callback_answer(message_id, CallbackAnswer::Alert("Not allowed".into()));
        h.messages.set_latency(Some(Duration::from_millis(5)));

        h.alerts.request_callback(&mut h.store, message_id, Vec::new());
        assert_eq!(top(&h), Some(TitlePanelContext::RequestInProgress));

        let Completion::Callback { ticket, answer } = next_completion(&mut h).await else {
            panic!("expected callback completion");
        };
        h.alerts.complete_callback(&mut h.store, ticket, answer);

        assert_eq!(top(&h), None);
        let mut alerts = Vec::new();
        while let Ok(event) = h.events.try_recv() {
            if let SessionEvent::Alert { text } = event {
                alerts.push(text);
            }
        }
        assert_eq!(alerts, vec!["Not allowed".to_owned()]);
    }

    #[tokio::test]
    async fn unknown_callback_reports_error() {
        let mut h = harness(Duration::from_secs(60));

        h.alerts
            .request_callback(&mut h.store, MessageId::new(PeerId(1), 99), Vec::new());

        let mut errors = Vec::new();
        while let Ok(event) = h.events.try_recv() {
            if let SessionEvent::Error(err) = event {
                errors.push(err.code);
            }
        }
        assert_eq!(errors, vec!["not_found".to_owned()]);
        assert_eq!(top(&h), None);
    }
}
