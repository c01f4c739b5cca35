use std::{sync::Arc, time::Duration};

use chat_core::{
    CachedPeerData, ChatHistoryState, ComposeState, EditState, InlineBot, InlineResult,
    InputMode, InterfaceState, KeyboardMessage, MediaRecordingMode, Message, MessageId,
    MessageIndex, PeerSnapshot, PresentationState, SearchDirection, SessionChannels,
    SessionCommand, SessionError, SessionErrorCategory, SessionEvent, SessionTuning,
    TextSelection, TitlePanelContext, TitlePanelKind, WindowOp, url_preview_key,
};
use chat_platform::{
    ContextQueryResolver, DispatchSink, LinkPreviewResolver, MessageStore, RecorderProvider,
};
use tokio::{
    sync::mpsc,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::{
    alerts::TitlePanelAlerts, completion::Completion, dispatcher::MessageDispatcher,
    navigation::MessageNavigator, recording::MediaRecordingCoordinator, search::SearchSession,
    store::PresentationStateStore,
};

/// Host capabilities a session is started with.
#[derive(Clone)]
pub struct SessionCollaborators {
    pub messages: Arc<dyn MessageStore>,
    pub dispatch: Arc<dyn DispatchSink>,
    pub recorder: Arc<dyn RecorderProvider>,
    pub context_queries: Arc<dyn ContextQueryResolver>,
    pub link_previews: Arc<dyn LinkPreviewResolver>,
}

/// Coordinator for one open conversation.
///
/// All state changes run on the task that owns the session. Background
/// resolutions report back as [`Completion`]s, which the owner feeds through
/// [`handle_completion`](Self::handle_completion) (or [`run`](Self::run)
/// does it for them).
pub struct ConversationSession {
    store: PresentationStateStore,
    recording: MediaRecordingCoordinator,
    search: SearchSession,
    navigator: MessageNavigator,
    dispatcher: MessageDispatcher,
    alerts: TitlePanelAlerts,
    channels: SessionChannels,
    tuning: SessionTuning,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
}

impl ConversationSession {
    /// Open `peer` with its persisted interface state and publish the first snapshot.
    pub fn start(
        peer: PeerSnapshot,
        interface_state: InterfaceState,
        collaborators: SessionCollaborators,
        tuning: SessionTuning,
        channels: SessionChannels,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let peer_id = peer.id;
        let is_muted = collaborators.messages.is_muted(peer_id);
        let unread_count = collaborators.messages.read_state(peer_id).unread_count;

        let store = PresentationStateStore::new(
            PresentationState::new(peer_id),
            collaborators.context_queries,
            collaborators.link_previews,
            completion_tx.clone(),
            channels.clone(),
        );
        let mut session = Self {
            store,
            recording: MediaRecordingCoordinator::new(
                collaborators.recorder,
                completion_tx.clone(),
                channels.clone(),
            ),
            search: SearchSession::new(Arc::clone(&collaborators.messages), completion_tx.clone()),
            navigator: MessageNavigator::new(
                Arc::clone(&collaborators.messages),
                tuning.window_max_items,
                tuning.history_fetch_count,
                completion_tx.clone(),
                channels.clone(),
            ),
            dispatcher: MessageDispatcher::new(
                collaborators.dispatch,
                completion_tx.clone(),
                channels.clone(),
            ),
            alerts: TitlePanelAlerts::new(
                collaborators.messages,
                Duration::from_millis(tuning.toast_duration_ms),
                completion_tx,
                channels.clone(),
            ),
            channels,
            tuning,
            completion_rx,
        };

        session.store.apply(|state| {
            state
                .with_peer(peer, is_muted)
                .with_interface_state(|interface| *interface = interface_state)
                .with_unread_badge(unread_badge(unread_count))
        });
        info!(peer = ?peer_id, unread_count, "conversation session started");
        session
    }

    pub fn state(&self) -> Arc<PresentationState> {
        self.store.state()
    }

    pub fn channels(&self) -> &SessionChannels {
        &self.channels
    }

    pub fn navigator(&self) -> &MessageNavigator {
        &self.navigator
    }

    /// Run an arbitrary transform through the reducer pipeline.
    pub fn apply<F>(&mut self, transform: F) -> Arc<PresentationState>
    where
        F: FnOnce(PresentationState) -> PresentationState,
    {
        self.store.apply(transform)
    }

    pub fn handle_command(&mut self, command: SessionCommand) -> Result<(), SessionError> {
        match command {
            SessionCommand::SetComposeText { text, selection } => {
                self.set_compose_text(text, selection);
            }
            SessionCommand::SetReplyMessage { message_id } => self.set_reply_message(message_id),
            SessionCommand::SetInputMode { mode } => self.set_input_mode(mode),
            SessionCommand::SetKeyboardMessage { message } => self.set_keyboard_message(message),
            SessionCommand::SetBotStartPayload { payload } => self.set_bot_start_payload(payload),
            SessionCommand::UpdatePeer { peer, is_muted } => self.update_peer(peer, is_muted)?,
            SessionCommand::UpdateCachedData {
                data,
                pinned_message,
            } => self.update_cached_data(&data, pinned_message),
            SessionCommand::SetHistoryState { state } => self.set_history_state(state),
            SessionCommand::SetChatInfoPanel { visible } => self.set_chat_info_panel(visible),
            SessionCommand::DismissPinnedMessage => self.dismiss_pinned_message(),
            SessionCommand::DismissReportPeer => self.dismiss_report_peer(),
            SessionCommand::DismissUrlPreview => self.dismiss_url_preview(),
            SessionCommand::DismissKeyboard { message_id } => self.dismiss_keyboard(message_id),
            SessionCommand::ToggleSelection { message_id } => self.toggle_selection(message_id),
            SessionCommand::ClearSelection => self.clear_selection(),
            SessionCommand::ShowToast { text } => self.show_toast(text),
            SessionCommand::RequestMessageCallback { message_id, data } => {
                self.request_message_callback(message_id, data);
            }
            SessionCommand::BeginMediaRecording { is_video } => {
                self.begin_media_recording(is_video)?;
            }
            SessionCommand::LockMediaRecording => self.lock_media_recording()?,
            SessionCommand::StopMediaRecording => self.stop_media_recording()?,
            SessionCommand::FinishMediaRecording { send } => {
                self.finish_media_recording(send)?;
            }
            SessionCommand::SwitchMediaRecordingMode => {
                self.switch_media_recording_mode()?;
            }
            SessionCommand::BeginSearch => self.begin_search(),
            SessionCommand::DismissSearch => self.dismiss_search(),
            SessionCommand::UpdateSearchQuery { query } => self.update_search_query(query),
            SessionCommand::NavigateSearch { direction } => self.navigate_search(direction),
            SessionCommand::NavigateToMessage {
                from,
                to,
                remember_in_stack,
            } => self.navigate_to_message(from, to, remember_in_stack),
            SessionCommand::NavigateBack => self.navigate_back(),
            SessionCommand::JumpToDate { timestamp } => self.jump_to_date(timestamp),
            SessionCommand::UpdateViewport {
                anchor,
                max_visible,
            } => self.update_viewport(anchor, max_visible),
            SessionCommand::ApplyWindowOps { ops } => self.apply_window_ops(&ops)?,
            SessionCommand::BeginEdit { message_id, text } => self.begin_edit(message_id, text),
            SessionCommand::UpdateEditText { text } => self.update_edit_text(text)?,
            SessionCommand::CancelEdit => self.cancel_edit(),
            SessionCommand::SubmitEdit => {
                self.submit_edit()?;
            }
            SessionCommand::SendText => {
                self.send_text()?;
            }
            SessionCommand::SendContextResult { bot, result } => {
                self.send_context_result(bot, result);
            }
            SessionCommand::SendBotCommand {
                command,
                bot_address,
            } => {
                self.send_bot_command(&command, bot_address.as_deref());
            }
            SessionCommand::StartBot => {
                self.start_bot();
            }
            SessionCommand::Shutdown => {
                debug!("shutdown is handled by the runtime loop");
            }
        }
        Ok(())
    }

    /// Route a background result to the component that requested it.
    pub fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::ContextQuery { ticket, result } => {
                self.store.complete_context_query(ticket, result);
            }
            Completion::UrlPreview { ticket, preview } => {
                self.store.complete_url_preview(ticket, preview);
            }
            Completion::RecorderAcquired { ticket, result } => {
                if let Err(err) =
                    self.recording
                        .complete_acquisition(&mut self.store, ticket, result)
                {
                    self.channels.emit(SessionEvent::Error(err));
                }
            }
            Completion::Search { ticket, found } => {
                if let Some(focused) = self.search.complete(&mut self.store, ticket, found) {
                    self.focus_search_match(focused);
                }
            }
            Completion::Lookup { ticket, outcome } => {
                self.navigator
                    .complete_lookup(&mut self.store, ticket, outcome);
            }
            Completion::Dispatch {
                client_txn_id,
                result,
            } => self
                .dispatcher
                .complete(&mut self.store, &client_txn_id, result),
            Completion::ToastExpired { ticket } => self.alerts.expire_toast(&mut self.store, ticket),
            Completion::Callback { ticket, answer } => {
                self.alerts
                    .complete_callback(&mut self.store, ticket, answer);
            }
        }
    }

    /// Wait for the next background result and handle it.
    ///
    /// Returns `false` once no producer can deliver anything anymore.
    pub async fn pump(&mut self) -> bool {
        match self.completion_rx.recv().await {
            Some(completion) => {
                self.handle_completion(completion);
                true
            }
            None => false,
        }
    }

    /// Serve commands until shutdown, then hand back the interface state to persist.
    pub async fn run(mut self, mut command_rx: mpsc::Receiver<SessionCommand>) -> InterfaceState {
        let mut ticker = interval(Duration::from_millis(self.tuning.recording_tick_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => {
                        if let Err(err) = self.handle_command(command) {
                            warn!(code = %err.code, %err, "session command failed");
                            self.channels.emit(SessionEvent::Error(err));
                        }
                    }
                },
                Some(completion) = self.completion_rx.recv() => self.handle_completion(completion),
                _ = ticker.tick(), if self.recording.is_active() => {
                    self.recording.refresh_progress(&mut self.store);
                }
            }
        }
        self.shutdown()
    }

    /// Cancel all outstanding work and return the interface state to persist.
    pub fn shutdown(mut self) -> InterfaceState {
        self.recording.shutdown();
        self.search.shutdown();
        self.navigator.shutdown();
        self.alerts.shutdown();
        self.store.shutdown();
        let pending = self.dispatcher.pending_count();
        info!(pending_dispatches = pending, "conversation session stopped");
        self.store.current().interface_state.clone()
    }

    pub fn set_compose_text(&mut self, text: String, selection: Option<TextSelection>) {
        self.store.apply(|state| {
            state.with_interface_state(|interface| {
                let selection =
                    selection.unwrap_or_else(|| TextSelection::caret(text.chars().count()));
                interface.compose.text = text;
                interface.compose.selection = selection;
            })
        });
    }

    pub fn set_reply_message(&mut self, message_id: Option<MessageId>) {
        self.store.apply(|state| {
            state.with_interface_state(|interface| interface.reply_message_id = message_id)
        });
    }

    pub fn set_input_mode(&mut self, mode: InputMode) {
        self.store.apply(|state| state.with_input_mode(mode));
    }

    pub fn set_keyboard_message(&mut self, message: Option<KeyboardMessage>) {
        self.store
            .apply(|state| state.with_keyboard_message(message));
    }

    pub fn set_bot_start_payload(&mut self, payload: Option<String>) {
        self.store
            .apply(|state| state.with_bot_start_payload(payload));
    }

    pub fn update_peer(&mut self, peer: PeerSnapshot, is_muted: bool) -> Result<(), SessionError> {
        let peer_id = self.store.current().peer_id;
        if peer.id != peer_id {
            return Err(SessionError::new(
                SessionErrorCategory::InvalidState,
                "peer_mismatch",
                format!("session for {peer_id:?} received peer {:?}", peer.id),
            ));
        }
        self.store.apply(|state| state.with_peer(peer, is_muted));
        Ok(())
    }

    pub fn update_cached_data(&mut self, data: &CachedPeerData, pinned_message: Option<Message>) {
        self.store
            .apply(|state| state.with_cached_data(data, pinned_message));
    }

    pub fn set_history_state(&mut self, history_state: ChatHistoryState) {
        self.store
            .apply(|state| state.with_history_state(history_state));
    }

    pub fn set_chat_info_panel(&mut self, visible: bool) {
        self.store.apply(|state| {
            state.with_title_panel_contexts(|contexts| {
                if visible {
                    contexts.insert(TitlePanelContext::ChatInfo);
                } else {
                    contexts.remove_kind(TitlePanelKind::ChatInfo);
                }
            })
        });
    }

    /// Hide the pinned banner until a different message gets pinned.
    pub fn dismiss_pinned_message(&mut self) {
        self.store.apply(|state| {
            let pinned = state.pinned_message_id;
            state
                .with_interface_state(|interface| {
                    interface.message_actions.closed_pinned_message_id = pinned;
                })
                .with_title_panel_contexts(|contexts| {
                    contexts.remove_kind(TitlePanelKind::PinnedMessage)
                })
        });
    }

    pub fn dismiss_report_peer(&mut self) {
        self.store.apply(|mut state| {
            state.can_report_peer = false;
            state
        });
    }

    /// Opt the focused input out of the preview for its current link.
    pub fn dismiss_url_preview(&mut self) {
        let current = self.store.current();
        let Some(url) = current
            .url_preview
            .as_ref()
            .map(|preview| preview.url.clone())
            .or_else(|| url_preview_key(current))
        else {
            debug!("no link preview to dismiss");
            return;
        };
        self.store.apply(|state| {
            state.with_interface_state(|interface| {
                let input = match interface.edit.as_mut() {
                    Some(edit) => &mut edit.input,
                    None => &mut interface.compose,
                };
                input.disabled_preview_url = Some(url);
            })
        });
    }

    pub fn dismiss_keyboard(&mut self, message_id: MessageId) {
        self.store.apply(|state| {
            let state = state.with_interface_state(|interface| {
                interface.message_actions.closed_keyboard_message_id = Some(message_id);
            });
            if state.input_mode == InputMode::InputButtons {
                state.with_input_mode(InputMode::Text)
            } else {
                state
            }
        });
    }

    pub fn toggle_selection(&mut self, message_id: MessageId) {
        self.store.apply(|state| {
            state.with_interface_state(|interface| interface.toggle_selection(message_id))
        });
    }

    pub fn clear_selection(&mut self) {
        self.store
            .apply(|state| state.with_interface_state(|interface| interface.selection = None));
    }

    pub fn show_toast(&mut self, text: String) {
        self.alerts.show_toast(&mut self.store, text);
    }

    pub fn request_message_callback(&mut self, message_id: MessageId, data: Vec<u8>) {
        self.alerts
            .request_callback(&mut self.store, message_id, data);
    }

    pub fn begin_media_recording(&mut self, is_video: bool) -> Result<(), SessionError> {
        self.recording.begin(&mut self.store, is_video)
    }

    pub fn lock_media_recording(&mut self) -> Result<(), SessionError> {
        self.recording.lock(&mut self.store)
    }

    pub fn stop_media_recording(&mut self) -> Result<(), SessionError> {
        self.recording.stop(&mut self.store)
    }

    /// Finish recording; returns the dispatch transaction when a take was sent.
    pub fn finish_media_recording(&mut self, send: bool) -> Result<Option<String>, SessionError> {
        let Some(message) = self.recording.finish(&mut self.store, send)? else {
            return Ok(None);
        };
        Ok(Some(self.dispatcher.send_media(&mut self.store, message)))
    }

    pub fn switch_media_recording_mode(&mut self) -> Result<MediaRecordingMode, SessionError> {
        self.recording.switch_mode(&mut self.store)
    }

    pub fn refresh_recording_progress(&mut self) {
        self.recording.refresh_progress(&mut self.store);
    }

    pub fn begin_search(&mut self) {
        self.search.begin(&mut self.store);
    }

    pub fn dismiss_search(&mut self) {
        self.search.dismiss(&mut self.store);
    }

    pub fn update_search_query(&mut self, query: String) {
        if let Some(focused) = self.search.update_query(&mut self.store, query) {
            self.focus_search_match(focused);
        }
    }

    pub fn navigate_search(&mut self, direction: SearchDirection) {
        if let Some(focused) = self.search.navigate(&mut self.store, direction) {
            self.focus_search_match(focused);
        }
    }

    pub fn navigate_to_message(
        &mut self,
        from: Option<MessageId>,
        to: MessageId,
        remember_in_stack: bool,
    ) {
        self.navigator
            .navigate_to_message(&mut self.store, from, to, remember_in_stack);
    }

    pub fn navigate_back(&mut self) {
        self.navigator.navigate_back(&mut self.store);
    }

    pub fn jump_to_date(&mut self, timestamp: u32) {
        self.navigator.jump_to_date(&mut self.store, timestamp);
    }

    pub fn update_viewport(&mut self, anchor: MessageIndex, max_visible: MessageIndex) {
        self.navigator.update_viewport(anchor, max_visible);
    }

    pub fn apply_window_ops(&mut self, ops: &[WindowOp]) -> Result<(), SessionError> {
        self.navigator.apply_window_ops(ops)
    }

    /// Seed the materialized window, e.g. with the first page after opening.
    pub fn replace_window(&mut self, messages: Vec<Message>) {
        let is_empty = messages.is_empty();
        self.navigator.replace_window(messages);
        self.set_history_state(ChatHistoryState::Loaded { is_empty });
    }

    pub fn begin_edit(&mut self, message_id: MessageId, text: String) {
        self.store.apply(|state| {
            state.with_interface_state(|interface| {
                interface.edit = Some(EditState {
                    message_id,
                    input: ComposeState::new(text),
                });
            })
        });
    }

    pub fn update_edit_text(&mut self, text: String) -> Result<(), SessionError> {
        if self.store.current().interface_state.edit.is_none() {
            return Err(SessionError::invalid_state("not editing", "update_edit_text"));
        }
        self.store.apply(|state| {
            state.with_interface_state(|interface| {
                if let Some(edit) = interface.edit.as_mut() {
                    edit.input.selection = TextSelection::caret(text.chars().count());
                    edit.input.text = text;
                }
            })
        });
        Ok(())
    }

    pub fn cancel_edit(&mut self) {
        self.store
            .apply(|state| state.with_interface_state(|interface| interface.edit = None));
    }

    pub fn submit_edit(&mut self) -> Result<String, SessionError> {
        self.dispatcher.submit_edit(&mut self.store)
    }

    pub fn send_text(&mut self) -> Result<Option<String>, SessionError> {
        self.dispatcher.send_text(&mut self.store)
    }

    pub fn send_context_result(&mut self, bot: InlineBot, result: InlineResult) -> String {
        self.dispatcher
            .send_context_result(&mut self.store, bot, result)
    }

    pub fn send_bot_command(&mut self, command: &str, bot_address: Option<&str>) -> String {
        self.dispatcher
            .send_bot_command(&mut self.store, command, bot_address)
    }

    pub fn start_bot(&mut self) -> String {
        self.dispatcher.start_bot(&mut self.store)
    }

    fn focus_search_match(&mut self, message_id: MessageId) {
        self.navigator
            .navigate_to_message(&mut self.store, None, message_id, false);
    }
}

/// Compact unread counter shown on the back button.
fn unread_badge(count: u32) -> Option<String> {
    match count {
        0 => None,
        1..=999 => Some(count.to_string()),
        _ => Some(format!("{}K", count / 1_000)),
    }
}
