//! Pure derivation of the input panel from a presentation snapshot.

use serde::{Deserialize, Serialize};

use crate::{
    query::ContextQueryResult,
    recording::RecordingProjection,
    state::{InputMode, PresentationState},
    types::PeerKind,
};

/// Icon shown next to the text field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccessoryItem {
    /// Switch back to the system keyboard.
    Keyboard,
    Stickers,
    /// Reopen the bot's custom keyboard.
    InputButtons,
    /// Secret-chat self-destruct timer, in seconds.
    AutoremoveTimeout(Option<u32>),
}

/// Source of the text field placeholder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Placeholder {
    #[default]
    Message,
    Broadcast,
    /// Placeholder advertised by an inline bot whose query is still empty.
    InlineBot(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InputPanelState {
    pub accessory_items: Vec<AccessoryItem>,
    pub placeholder: Placeholder,
    pub recording: Option<RecordingProjection>,
}

pub fn derive_input_panel(state: &PresentationState) -> InputPanelState {
    InputPanelState {
        accessory_items: accessory_items(state),
        placeholder: placeholder(state),
        recording: state.recording,
    }
}

fn accessory_items(state: &PresentationState) -> Vec<AccessoryItem> {
    match state.input_mode {
        InputMode::InputButtons | InputMode::Media => return vec![AccessoryItem::Keyboard],
        InputMode::None | InputMode::Text => {}
    }
    if state.interface_state.edit.is_some() || !state.interface_state.compose.is_empty() {
        return Vec::new();
    }

    let mut items = Vec::new();
    if let Some(PeerKind::SecretChat {
        autoremove_timeout_secs,
    }) = state.peer.as_ref().map(|peer| &peer.kind)
    {
        items.push(AccessoryItem::AutoremoveTimeout(*autoremove_timeout_secs));
    }
    items.push(AccessoryItem::Stickers);
    if state
        .keyboard_message
        .as_ref()
        .is_some_and(|message| message.visible_markup().is_some())
    {
        items.push(AccessoryItem::InputButtons);
    }
    items
}

fn placeholder(state: &PresentationState) -> Placeholder {
    if let Some(ContextQueryResult::InlineResults { bot, .. }) = &state.context_query_result
        && let Some(text) = &bot.placeholder
        && state.context_query.as_ref().is_some_and(|query| query.is_empty_inline())
    {
        return Placeholder::InlineBot(text.clone());
    }
    if state
        .peer
        .as_ref()
        .is_some_and(|peer| peer.is_broadcast_channel())
    {
        return Placeholder::Broadcast;
    }
    Placeholder::Message
}
