//! Reconciliation of bot reply keyboards against the text input.

use tracing::debug;

use crate::{
    state::{InputMode, PresentationState},
    types::{MessageId, ReplyMarkup},
};

fn visible_keyboard(state: &PresentationState) -> Option<(MessageId, &ReplyMarkup)> {
    let message = state.keyboard_message.as_ref()?;
    message.visible_markup().map(|markup| (message.id, markup))
}

/// Adjust `candidate` after the keyboard message may have changed.
///
/// Edit and draft emptiness are read from `previous`, the dismissal marker
/// and the bot-start payload from `candidate`.
pub fn reconcile_keyboard(
    previous: &PresentationState,
    mut candidate: PresentationState,
) -> PresentationState {
    if visible_keyboard(previous) != visible_keyboard(&candidate) {
        match visible_keyboard(&candidate).map(|(id, _)| id) {
            Some(keyboard_id) => {
                let closed = candidate
                    .interface_state
                    .message_actions
                    .closed_keyboard_message_id;
                if previous.interface_state.edit.is_none()
                    && previous.interface_state.compose.is_empty()
                    && closed != Some(keyboard_id)
                    && candidate.bot_start_payload.is_none()
                {
                    debug!(keyboard = ?keyboard_id, "switching input to keyboard buttons");
                    candidate.input_mode = InputMode::InputButtons;
                }

                if candidate
                    .peer
                    .as_ref()
                    .is_some_and(|peer| peer.is_group_like())
                {
                    candidate = apply_setup_reply(candidate, keyboard_id);
                }
            }
            None => {
                if candidate.input_mode == InputMode::InputButtons {
                    candidate.input_mode = InputMode::Text;
                }
            }
        }
    }

    if let Some(keyboard_id) = candidate
        .keyboard_message
        .as_ref()
        .filter(|message| message.requests_setup_reply)
        .map(|message| message.id)
    {
        candidate = apply_setup_reply(candidate, keyboard_id);
    }

    candidate
}

fn apply_setup_reply(mut state: PresentationState, keyboard_id: MessageId) -> PresentationState {
    let interface = &mut state.interface_state;
    if interface.reply_message_id.is_none()
        && interface.message_actions.processed_setup_reply_message_id != Some(keyboard_id)
    {
        debug!(keyboard = ?keyboard_id, "auto-replying to keyboard message");
        interface.reply_message_id = Some(keyboard_id);
        interface.message_actions.processed_setup_reply_message_id = Some(keyboard_id);
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        state::ComposeState,
        types::{KeyboardMessage, PeerId, PeerKind, PeerSnapshot},
    };

    fn id(n: i32) -> MessageId {
        MessageId::new(PeerId(3), n)
    }

    fn keyboard(n: i32, setup_reply: bool) -> KeyboardMessage {
        KeyboardMessage {
            id: id(n),
            stable_version: 0,
            markup: Some(ReplyMarkup {
                rows: vec![vec!["A".into(), "B".into()]],
                hides_keyboard: false,
                single_use: false,
            }),
            requests_setup_reply: setup_reply,
        }
    }

    fn group() -> PeerSnapshot {
        PeerSnapshot {
            id: PeerId(3),
            title: "Group".into(),
            address_name: None,
            kind: PeerKind::Group,
        }
    }

    #[test]
    fn new_keyboard_forces_button_mode() {
        let previous = PresentationState::new(PeerId(3));
        let candidate = previous.clone().with_keyboard_message(Some(keyboard(1, false)));

        let reconciled = reconcile_keyboard(&previous, candidate);
        assert_eq!(reconciled.input_mode, InputMode::InputButtons);
    }

    #[test]
    fn non_empty_previous_draft_keeps_text_mode() {
        let previous = PresentationState::new(PeerId(3))
            .with_interface_state(|interface| interface.compose = ComposeState::new("typing"));
        let candidate = previous.clone().with_keyboard_message(Some(keyboard(1, false)));

        assert_eq!(
            reconcile_keyboard(&previous, candidate).input_mode,
            InputMode::Text
        );
    }

    #[test]
    fn dismissed_keyboard_or_pending_payload_keeps_text_mode() {
        let previous = PresentationState::new(PeerId(3));

        let dismissed = previous
            .clone()
            .with_interface_state(|interface| {
                interface.message_actions.closed_keyboard_message_id = Some(id(1));
            })
            .with_keyboard_message(Some(keyboard(1, false)));
        assert_eq!(
            reconcile_keyboard(&previous, dismissed).input_mode,
            InputMode::Text
        );

        let with_payload = previous
            .clone()
            .with_bot_start_payload(Some("ref".into()))
            .with_keyboard_message(Some(keyboard(1, false)));
        assert_eq!(
            reconcile_keyboard(&previous, with_payload).input_mode,
            InputMode::Text
        );
    }

    #[test]
    fn disappearing_keyboard_reverts_to_text() {
        let previous = PresentationState::new(PeerId(3))
            .with_keyboard_message(Some(keyboard(1, false)))
            .with_input_mode(InputMode::InputButtons);
        let candidate = previous.clone().with_keyboard_message(None);

        assert_eq!(
            reconcile_keyboard(&previous, candidate).input_mode,
            InputMode::Text
        );
    }

    #[test]
    fn group_keyboard_sets_reply_once() {
        let previous = PresentationState::new(PeerId(3)).with_peer(group(), false);
        let candidate = previous.clone().with_keyboard_message(Some(keyboard(4, false)));

        let reconciled = reconcile_keyboard(&previous, candidate);
        assert_eq!(reconciled.interface_state.reply_message_id, Some(id(4)));
        assert_eq!(
            reconciled
                .interface_state
                .message_actions
                .processed_setup_reply_message_id,
            Some(id(4))
        );

        // The user cleared the reply; the same keyboard must not re-apply it.
        let cleared = reconciled
            .clone()
            .with_interface_state(|interface| interface.reply_message_id = None);
        let again = reconcile_keyboard(&reconciled, cleared);
        assert_eq!(again.interface_state.reply_message_id, None);
    }

    #[test]
    fn setup_reply_request_does_not_override_existing_reply() {
        let previous = PresentationState::new(PeerId(3))
            .with_interface_state(|interface| interface.reply_message_id = Some(id(2)));
        let candidate = previous.clone().with_keyboard_message(Some(keyboard(5, true)));

        let reconciled = reconcile_keyboard(&previous, candidate);
        assert_eq!(reconciled.interface_state.reply_message_id, Some(id(2)));
    }

    #[test]
    fn setup_reply_request_applies_in_one_to_one_chat() {
        let previous = PresentationState::new(PeerId(3));
        let candidate = previous.clone().with_keyboard_message(Some(keyboard(5, true)));

        let reconciled = reconcile_keyboard(&previous, candidate);
        assert_eq!(reconciled.interface_state.reply_message_id, Some(id(5)));
    }
}
