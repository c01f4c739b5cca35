//! Outgoing message assembly and dispatch acknowledgement.
//!
//! Every send gets a client transaction id. Transient input state (draft,
//! reply target, edit buffer, bot-start payload) is cleared only once the
//! sink confirms the transaction, so a failed send leaves it in place.

use std::{collections::HashMap, sync::Arc};

use chat_core::{
    ComposeState, DispatchOutcome, InlineBot, InlineResult, MessageAttribute, MessageId,
    OutgoingMessage, Resolution, SessionChannels, SessionError, classify_dispatch_error_message,
    normalize_dispatch_outcome, text_entities,
};
use chat_platform::{DispatchSink, PlatformError};
use tracing::{debug, info, warn};

use crate::{
    completion::{Completion, CompletionSender},
    store::PresentationStateStore,
};

type DispatchResult = Result<Vec<MessageId>, PlatformError>;

/// Transient state released when a transaction succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ClearOnSuccess {
    /// Draft and reply target, unless the user already moved on.
    Compose {
        text: String,
        reply_to: Option<MessageId>,
    },
    Reply {
        reply_to: Option<MessageId>,
    },
    BotStartPayload,
    Edit {
        message_id: MessageId,
    },
    Nothing,
}

pub struct MessageDispatcher {
    sink: Arc<dyn DispatchSink>,
    next_txn_id: u64,
    pending: HashMap<String, ClearOnSuccess>,
    completions: CompletionSender,
    channels: SessionChannels,
}

impl MessageDispatcher {
    pub fn new(
        sink: Arc<dyn DispatchSink>,
        completions: CompletionSender,
        channels: SessionChannels,
    ) -> Self {
        Self {
            sink,
            next_txn_id: 0,
            pending: HashMap::new(),
            completions,
            channels,
        }
    }

    /// Send the draft, or submit the edit buffer while editing.
    ///
    /// Returns `None` when there is nothing to send.
    pub fn send_text(
        &mut self,
        store: &mut PresentationStateStore,
    ) -> Result<Option<String>, SessionError> {
        let state = store.current();
        if state.interface_state.edit.is_some() {
            return self.submit_edit(store).map(Some);
        }

        let text = state.interface_state.compose.text.trim();
        if text.is_empty() {
            debug!("draft is blank; nothing to send");
            return Ok(None);
        }
        let reply_to = state.interface_state.reply_message_id;
        let clear = ClearOnSuccess::Compose {
            text: state.interface_state.compose.text.clone(),
            reply_to,
        };
        let message = OutgoingMessage {
            text: text.to_owned(),
            attributes: entity_attributes(text),
            media: None,
            reply_to,
        };
        Ok(Some(self.enqueue(store, vec![message], clear)))
    }

    /// Send a finished recording or any other prepared media message.
    pub fn send_media(
        &mut self,
        store: &mut PresentationStateStore,
        message: OutgoingMessage,
    ) -> String {
        self.enqueue(store, vec![message], ClearOnSuccess::Nothing)
    }

    /// Send a picked inline bot result on behalf of the user.
    pub fn send_context_result(
        &mut self,
        store: &mut PresentationStateStore,
        bot: InlineBot,
        result: InlineResult,
    ) -> String {
        let compose = &store.current().interface_state;
        let clear = ClearOnSuccess::Compose {
            text: compose.compose.text.clone(),
            reply_to: compose.reply_message_id,
        };
        let message = OutgoingMessage {
            text: result.message_text,
            attributes: vec![MessageAttribute::ViaInlineBot(bot.peer_id)],
            media: None,
            reply_to: compose.reply_message_id,
        };
        debug!(bot = %bot.address_name, result = %result.id, "sending inline result");
        self.enqueue(store, vec![message], clear)
    }

    /// Send a bot command; outside one-to-one chats it is addressed as `/cmd@bot`.
    pub fn send_bot_command(
        &mut self,
        store: &mut PresentationStateStore,
        command: &str,
        bot_address: Option<&str>,
    ) -> String {
        let state = store.current();
        let one_to_one = state.peer.as_ref().is_some_and(|peer| peer.is_one_to_one());
        let text = match bot_address {
            Some(address) if !one_to_one => format!("{command}@{address}"),
            _ => command.to_owned(),
        };
        let reply_to = state.interface_state.reply_message_id;
        let message = OutgoingMessage {
            attributes: entity_attributes(&text),
            text,
            media: None,
            reply_to,
        };
        self.enqueue(store, vec![message], ClearOnSuccess::Reply { reply_to })
    }

    /// Send `/start`, carrying the pending deep-link payload if any.
    pub fn start_bot(&mut self, store: &mut PresentationStateStore) -> String {
        let payload = store.current().bot_start_payload.clone();
        let message = OutgoingMessage {
            text: "/start".to_owned(),
            attributes: payload
                .map(MessageAttribute::BotStartPayload)
                .into_iter()
                .collect(),
            media: None,
            reply_to: None,
        };
        self.enqueue(store, vec![message], ClearOnSuccess::BotStartPayload)
    }

    pub fn submit_edit(
        &mut self,
        store: &mut PresentationStateStore,
    ) -> Result<String, SessionError> {
        let Some(edit) = store.current().interface_state.edit.clone() else {
            return Err(SessionError::invalid_state("not editing", "submit_edit"));
        };
        let message_id = edit.message_id;
        let resolution = self
            .sink
            .edit(message_id, edit.input.text)
            .map(move |result| result.map(|()| vec![message_id]));
        Ok(self.track(store, ClearOnSuccess::Edit { message_id }, resolution))
    }

    /// Deliver a deferred sink answer.
    pub fn complete(
        &mut self,
        store: &mut PresentationStateStore,
        client_txn_id: &str,
        result: DispatchResult,
    ) {
        let Some(clear) = self.pending.remove(client_txn_id) else {
            warn!(txn = client_txn_id, "acknowledgement for unknown transaction");
            return;
        };

        let outcome = match result {
            Ok(message_ids) => {
                info!(txn = client_txn_id, count = message_ids.len(), "dispatch succeeded");
                clear_transient_state(store, clear);
                DispatchOutcome::Success { message_ids }
            }
            Err(err) => {
                warn!(txn = client_txn_id, %err, "dispatch failed; input state kept");
                DispatchOutcome::Failure {
                    error: classify_dispatch_error_message(err.to_string()),
                }
            }
        };
        self.channels
            .emit(normalize_dispatch_outcome(client_txn_id, outcome));
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn enqueue(
        &mut self,
        store: &mut PresentationStateStore,
        messages: Vec<OutgoingMessage>,
        clear: ClearOnSuccess,
    ) -> String {
        let peer_id = store.current().peer_id;
        let resolution = self.sink.enqueue(peer_id, messages);
        self.track(store, clear, resolution)
    }

    fn track(
        &mut self,
        store: &mut PresentationStateStore,
        clear: ClearOnSuccess,
        resolution: Resolution<DispatchResult>,
    ) -> String {
        self.next_txn_id += 1;
        let client_txn_id = format!("txn-{}", self.next_txn_id);
        self.pending.insert(client_txn_id.clone(), clear);

        match resolution {
            Resolution::Immediate(result) => self.complete(store, &client_txn_id, result),
            Resolution::Pending(future) => {
                debug!(txn = %client_txn_id, "dispatch awaiting sink");
                let completions = self.completions.clone();
                let txn = client_txn_id.clone();
                tokio::spawn(async move {
                    let result = future.await;
                    let _ = completions.send(Completion::Dispatch {
                        client_txn_id: txn,
                        result,
                    });
                });
            }
        }
        client_txn_id
    }
}

fn entity_attributes(text: &str) -> Vec<MessageAttribute> {
    let entities = text_entities(text);
    if entities.is_empty() {
        Vec::new()
    } else {
        vec![MessageAttribute::TextEntities(entities)]
    }
}

fn clear_transient_state(store: &mut PresentationStateStore, clear: ClearOnSuccess) {
    match clear {
        ClearOnSuccess::Compose { text, reply_to } => {
            store.apply(|state| {
                state.with_interface_state(|interface| {
                    if interface.compose.text == text {
                        interface.compose = ComposeState::default();
                    }
                    if interface.reply_message_id == reply_to {
                        interface.reply_message_id = None;
                    }
                })
            });
        }
        ClearOnSuccess::Reply { reply_to } => {
            store.apply(|state| {
                state.with_interface_state(|interface| {
                    if interface.reply_message_id == reply_to {
                        interface.reply_message_id = None;
                    }
                })
            });
        }
        ClearOnSuccess::BotStartPayload => {
            store.apply(|state| state.with_bot_start_payload(None));
        }
        ClearOnSuccess::Edit { message_id } => {
            store.apply(|state| {
                state.with_interface_state(|interface| {
                    if interface
                        .edit
                        .as_ref()
                        .is_some_and(|edit| edit.message_id == message_id)
                    {
                        interface.edit = None;
                    }
                })
            });
        }
        ClearOnSuccess::Nothing => {}
    }
}
