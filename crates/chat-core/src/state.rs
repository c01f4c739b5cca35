//! Conversation presentation snapshot and the persisted interface sub-state.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    input_panel::{InputPanelState, derive_input_panel},
    query::{ContextQuery, ContextQueryResult},
    recording::{MediaRecordingMode, RecordingProjection},
    search::SearchState,
    title_panel::{TitlePanelContext, TitlePanelContexts, TitlePanelKind},
    types::{
        CachedPeerData, ChatHistoryState, KeyboardMessage, LinkPreview, Message, MessageId,
        PeerId, PeerSnapshot,
    },
};

/// Caret or selected range inside a text input, counted in characters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TextSelection {
    pub start: usize,
    pub end: usize,
}

impl TextSelection {
    pub fn caret(position: usize) -> Self {
        Self {
            start: position,
            end: position,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// Text input contents plus the per-draft link-preview opt-out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ComposeState {
    pub text: String,
    pub selection: TextSelection,
    /// URL whose preview the user dismissed for this draft.
    pub disabled_preview_url: Option<String>,
}

impl ComposeState {
    /// Text with the caret placed after the last character.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let selection = TextSelection::caret(text.chars().count());
        Self {
            text,
            selection,
            disabled_preview_url: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EditState {
    pub message_id: MessageId,
    pub input: ComposeState,
}

/// Markers recording which one-shot UI affordances the user already consumed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct MessageActionsState {
    pub closed_keyboard_message_id: Option<MessageId>,
    pub processed_setup_reply_message_id: Option<MessageId>,
    pub closed_pinned_message_id: Option<MessageId>,
}

/// Per-conversation interface state persisted across sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct InterfaceState {
    pub compose: ComposeState,
    pub reply_message_id: Option<MessageId>,
    pub edit: Option<EditState>,
    pub media_recording_mode: MediaRecordingMode,
    /// `Some` while multi-select is active.
    pub selection: Option<BTreeSet<MessageId>>,
    pub message_actions: MessageActionsState,
}

impl InterfaceState {
    /// Toggle membership of `id`, entering multi-select when needed.
    pub fn toggle_selection(&mut self, id: MessageId) {
        let selection = self.selection.get_or_insert_with(BTreeSet::new);
        if !selection.remove(&id) {
            selection.insert(id);
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum InputMode {
    None,
    #[default]
    Text,
    Media,
    InputButtons,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPreview {
    /// URL detected in the draft, which is also the slot key.
    pub url: String,
    pub preview: LinkPreview,
}

/// Immutable snapshot of everything the conversation screen renders.
///
/// Snapshots are replaced wholesale by the state store; the input panel is
/// derived from the other fields and only recomputed through
/// [`PresentationState::with_derived_input_panel`].
#[derive(Debug, Clone, PartialEq)]
pub struct PresentationState {
    pub peer_id: PeerId,
    pub peer: Option<PeerSnapshot>,
    pub peer_is_muted: bool,
    pub peer_is_blocked: bool,
    pub can_report_peer: bool,
    pub interface_state: InterfaceState,
    pub input_mode: InputMode,
    pub keyboard_message: Option<KeyboardMessage>,
    pub bot_start_payload: Option<String>,
    pub title_panel_contexts: TitlePanelContexts,
    pub pinned_message_id: Option<MessageId>,
    pub pinned_message: Option<Message>,
    pub search: Option<SearchState>,
    pub context_query: Option<ContextQuery>,
    pub context_query_result: Option<ContextQueryResult>,
    pub url_preview: Option<UrlPreview>,
    pub recording: Option<RecordingProjection>,
    pub history_state: ChatHistoryState,
    pub is_loading_message: bool,
    pub unread_badge: Option<String>,
    input_panel: InputPanelState,
}

impl PresentationState {
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            peer: None,
            peer_is_muted: false,
            peer_is_blocked: false,
            can_report_peer: false,
            interface_state: InterfaceState::default(),
            input_mode: InputMode::Text,
            keyboard_message: None,
            bot_start_payload: None,
            title_panel_contexts: TitlePanelContexts::default(),
            pinned_message_id: None,
            pinned_message: None,
            search: None,
            context_query: None,
            context_query_result: None,
            url_preview: None,
            recording: None,
            history_state: ChatHistoryState::Loading,
            is_loading_message: false,
            unread_badge: None,
            input_panel: InputPanelState::default(),
        }
        .with_derived_input_panel()
    }

    /// Derived input panel, consistent with the rest of the snapshot.
    pub fn input_panel(&self) -> &InputPanelState {
        &self.input_panel
    }

    /// The text input currently focused: the edit buffer while editing, the draft otherwise.
    pub fn input_text(&self) -> &ComposeState {
        match &self.interface_state.edit {
            Some(edit) => &edit.input,
            None => &self.interface_state.compose,
        }
    }

    pub fn with_derived_input_panel(mut self) -> Self {
        self.input_panel = derive_input_panel(&self);
        self
    }

    pub fn with_interface_state(mut self, update: impl FnOnce(&mut InterfaceState)) -> Self {
        update(&mut self.interface_state);
        self
    }

    pub fn with_title_panel_contexts(mut self, update: impl FnOnce(&mut TitlePanelContexts)) -> Self {
        update(&mut self.title_panel_contexts);
        self
    }

    pub fn with_peer(mut self, peer: PeerSnapshot, is_muted: bool) -> Self {
        self.peer = Some(peer);
        self.peer_is_muted = is_muted;
        self
    }

    pub fn with_input_mode(mut self, input_mode: InputMode) -> Self {
        self.input_mode = input_mode;
        self
    }

    pub fn with_keyboard_message(mut self, keyboard_message: Option<KeyboardMessage>) -> Self {
        self.keyboard_message = keyboard_message;
        self
    }

    pub fn with_bot_start_payload(mut self, payload: Option<String>) -> Self {
        self.bot_start_payload = payload;
        self
    }

    pub fn with_search(mut self, search: Option<SearchState>) -> Self {
        self.search = search;
        self
    }

    pub fn with_context_query_result(mut self, result: Option<ContextQueryResult>) -> Self {
        self.context_query_result = result;
        self
    }

    pub fn with_url_preview(mut self, url_preview: Option<UrlPreview>) -> Self {
        self.url_preview = url_preview;
        self
    }

    pub fn with_recording(mut self, recording: Option<RecordingProjection>) -> Self {
        self.recording = recording;
        self
    }

    pub fn with_loading_message(mut self, is_loading_message: bool) -> Self {
        self.is_loading_message = is_loading_message;
        self
    }

    pub fn with_history_state(mut self, history_state: ChatHistoryState) -> Self {
        self.history_state = history_state;
        self
    }

    pub fn with_unread_badge(mut self, unread_badge: Option<String>) -> Self {
        self.unread_badge = unread_badge;
        self
    }

    /// Fold freshly delivered cached peer data into the snapshot.
    ///
    /// The pinned banner is shown for a new pinned id unless the user already
    /// closed the banner for that same id.
    pub fn with_cached_data(mut self, data: &CachedPeerData, pinned_message: Option<Message>) -> Self {
        let pinned_message_id = data.pinned_message_id();
        self.peer_is_blocked = data.is_blocked();
        self.can_report_peer = data.can_report();
        self.pinned_message = pinned_message.filter(|message| Some(message.id) == pinned_message_id);
        self.pinned_message_id = pinned_message_id;

        let closed = self.interface_state.message_actions.closed_pinned_message_id;
        match pinned_message_id {
            Some(id) if closed != Some(id) => {
                self.title_panel_contexts
                    .insert(TitlePanelContext::PinnedMessage);
            }
            _ => self
                .title_panel_contexts
                .remove_kind(TitlePanelKind::PinnedMessage),
        }
        self
    }
}
