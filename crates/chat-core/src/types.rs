use std::{collections::BTreeSet, sync::Arc};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::SessionError,
    query::{InlineBot, InlineResult},
    search::SearchDirection,
    state::{InputMode, PresentationState, TextSelection},
    window::WindowOp,
};

/// Stable identifier of a conversation peer (user, group, channel or secret chat).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub i64);

/// Globally unique message reference: owning peer plus peer-local id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId {
    pub peer_id: PeerId,
    pub id: i32,
}

impl MessageId {
    pub fn new(peer_id: PeerId, id: i32) -> Self {
        Self { peer_id, id }
    }
}

/// Totally ordered position of a message within its conversation.
///
/// Ordering compares `timestamp` first and falls back to the message id, so
/// two messages sent in the same second still have a stable order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageIndex {
    /// Unix timestamp in seconds.
    pub timestamp: u32,
    pub id: MessageId,
}

impl MessageIndex {
    pub fn new(timestamp: u32, id: MessageId) -> Self {
        Self { timestamp, id }
    }
}

/// Materialized message as held by the store and the loaded window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    /// Unix timestamp in seconds.
    pub timestamp: u32,
    pub author_id: Option<PeerId>,
    pub text: String,
    /// Bumped by the store whenever the message content changes.
    pub stable_version: u32,
}

impl Message {
    pub fn index(&self) -> MessageIndex {
        MessageIndex::new(self.timestamp, self.id)
    }
}

/// Custom reply keyboard attached to a bot message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ReplyMarkup {
    pub rows: Vec<Vec<String>>,
    /// The bot asked clients to hide any previously shown keyboard.
    pub hides_keyboard: bool,
    pub single_use: bool,
}

/// The message currently requesting a custom keyboard in this conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyboardMessage {
    pub id: MessageId,
    pub stable_version: u32,
    pub markup: Option<ReplyMarkup>,
    /// The bot asked for a forced reply to this message.
    pub requests_setup_reply: bool,
}

impl KeyboardMessage {
    /// Markup that should actually be displayed, if any.
    pub fn visible_markup(&self) -> Option<&ReplyMarkup> {
        self.markup
            .as_ref()
            .filter(|markup| !markup.hides_keyboard && !markup.rows.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PeerKind {
    User { is_bot: bool },
    Group,
    Channel { is_broadcast: bool },
    SecretChat { autoremove_timeout_secs: Option<u32> },
}

/// Descriptive snapshot of the conversation peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerSnapshot {
    pub id: PeerId,
    pub title: String,
    /// Public username without the leading `@`.
    pub address_name: Option<String>,
    pub kind: PeerKind,
}

impl PeerSnapshot {
    /// Groups and channels, where bot keyboards auto-reply.
    pub fn is_group_like(&self) -> bool {
        matches!(self.kind, PeerKind::Group | PeerKind::Channel { .. })
    }

    pub fn is_broadcast_channel(&self) -> bool {
        matches!(self.kind, PeerKind::Channel { is_broadcast: true })
    }

    pub fn is_one_to_one(&self) -> bool {
        matches!(self.kind, PeerKind::User { .. } | PeerKind::SecretChat { .. })
    }
}

/// Slow-changing per-peer data delivered by the store, one shape per peer kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CachedPeerData {
    Channel {
        pinned_message_id: Option<MessageId>,
        can_report: bool,
    },
    User {
        is_blocked: bool,
        can_report: bool,
    },
    Group {
        pinned_message_id: Option<MessageId>,
        can_report: bool,
    },
    SecretChat {
        can_report: bool,
    },
}

impl CachedPeerData {
    pub fn pinned_message_id(&self) -> Option<MessageId> {
        match self {
            Self::Channel {
                pinned_message_id, ..
            }
            | Self::Group {
                pinned_message_id, ..
            } => *pinned_message_id,
            Self::User { .. } | Self::SecretChat { .. } => None,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::User { is_blocked: true, .. })
    }

    pub fn can_report(&self) -> bool {
        match self {
            Self::Channel { can_report, .. }
            | Self::User { can_report, .. }
            | Self::Group { can_report, .. }
            | Self::SecretChat { can_report } => *can_report,
        }
    }
}

/// Rendered preview for a link found in the draft.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkPreview {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TextEntityKind {
    Url,
    Mention,
    Hashtag,
    BotCommand,
}

/// Entity span over the message text, counted in characters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextEntity {
    pub kind: TextEntityKind,
    pub offset: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageAttribute {
    TextEntities(Vec<TextEntity>),
    /// Deep-link payload carried by the first `/start` sent to a bot.
    BotStartPayload(String),
    ViaInlineBot(PeerId),
}

/// Media attached to an outgoing message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutgoingMedia {
    VoiceNote {
        /// Locally generated resource id the upload pipeline keys the data by.
        resource_id: Uuid,
        mime_type: String,
        data: Vec<u8>,
        duration_secs: u32,
        waveform: Option<Vec<u8>>,
    },
    InstantVideo {
        resource_id: Uuid,
        data: Vec<u8>,
        duration_secs: u32,
    },
}

/// Fully described message handed to the dispatch sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct OutgoingMessage {
    pub text: String,
    pub attributes: Vec<MessageAttribute>,
    pub media: Option<OutgoingMedia>,
    pub reply_to: Option<MessageId>,
}

/// Loading state of the conversation history shown behind the panels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ChatHistoryState {
    #[default]
    Loading,
    Loaded {
        is_empty: bool,
    },
}

/// Haptic/sound feedback requested from the host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FeedbackKind {
    Tap,
    Success,
    Error,
}

/// Stable acknowledgement for an enqueue or edit transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchAck {
    /// Session-generated transaction ID (`txn-{n}`).
    pub client_txn_id: String,
    /// Ids assigned by the sink on success.
    pub message_ids: Vec<MessageId>,
    /// Stable error code on failure.
    pub error_code: Option<String>,
}

/// Tuning values for one conversation session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionTuning {
    /// Messages requested around the target when navigating outside the window.
    pub history_fetch_count: usize,
    /// How long a toast stays in the title panel.
    pub toast_duration_ms: u64,
    /// Upper bound of messages kept in the materialized window.
    pub window_max_items: usize,
    /// Interval of the elapsed-time refresh while recording.
    pub recording_tick_ms: u64,
    pub command_buffer: usize,
    pub event_buffer: usize,
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self {
            history_fetch_count: 50,
            toast_duration_ms: 4_000,
            window_max_items: 200,
            recording_tick_ms: 250,
            command_buffer: 64,
            event_buffer: 256,
        }
    }
}

/// Command channel input accepted by the session runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionCommand {
    /// Replace the draft text and caret/selection.
    SetComposeText {
        text: String,
        /// Defaults to a caret at the end of `text`.
        selection: Option<TextSelection>,
    },
    SetReplyMessage {
        message_id: Option<MessageId>,
    },
    SetInputMode {
        mode: InputMode,
    },
    SetKeyboardMessage {
        message: Option<KeyboardMessage>,
    },
    SetBotStartPayload {
        payload: Option<String>,
    },
    UpdatePeer {
        peer: PeerSnapshot,
        is_muted: bool,
    },
    UpdateCachedData {
        data: CachedPeerData,
        pinned_message: Option<Message>,
    },
    SetHistoryState {
        state: ChatHistoryState,
    },
    SetChatInfoPanel {
        visible: bool,
    },
    DismissPinnedMessage,
    DismissReportPeer,
    DismissUrlPreview,
    DismissKeyboard {
        message_id: MessageId,
    },
    ToggleSelection {
        message_id: MessageId,
    },
    ClearSelection,
    ShowToast {
        text: String,
    },
    RequestMessageCallback {
        message_id: MessageId,
        data: Vec<u8>,
    },
    BeginMediaRecording {
        is_video: bool,
    },
    LockMediaRecording,
    StopMediaRecording,
    FinishMediaRecording {
        send: bool,
    },
    SwitchMediaRecordingMode,
    BeginSearch,
    DismissSearch,
    UpdateSearchQuery {
        query: String,
    },
    NavigateSearch {
        direction: SearchDirection,
    },
    NavigateToMessage {
        from: Option<MessageId>,
        to: MessageId,
        remember_in_stack: bool,
    },
    NavigateBack,
    JumpToDate {
        timestamp: u32,
    },
    UpdateViewport {
        anchor: MessageIndex,
        max_visible: MessageIndex,
    },
    ApplyWindowOps {
        ops: Vec<WindowOp>,
    },
    BeginEdit {
        message_id: MessageId,
        text: String,
    },
    UpdateEditText {
        text: String,
    },
    CancelEdit,
    SubmitEdit,
    SendText,
    SendContextResult {
        bot: InlineBot,
        result: InlineResult,
    },
    SendBotCommand {
        command: String,
        /// Bot username appended as `@name` outside one-to-one chats.
        bot_address: Option<String>,
    },
    StartBot,
    /// Cancel all outstanding work and stop the runtime.
    Shutdown,
}

/// Event stream output emitted by the session runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A new presentation snapshot was committed.
    StateUpdated(Arc<PresentationState>),
    /// The multi-select set changed identity.
    SelectionChanged(Option<BTreeSet<MessageId>>),
    /// Target message is in the loaded window; the renderer should scroll to it.
    ScrollToMessage {
        from: Option<MessageIndex>,
        to: MessageIndex,
    },
    /// History stack was empty on jump-back.
    ScrollToLatest,
    /// Navigation target belongs to another conversation.
    OpenConversation { message_id: MessageId },
    OpenUrl { url: String },
    Feedback(FeedbackKind),
    Alert { text: String },
    DispatchAck(DispatchAck),
    Error(SessionError),
}

impl SessionEvent {
    /// Stable name of the event variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StateUpdated(_) => "state_updated",
            Self::SelectionChanged(_) => "selection_changed",
            Self::ScrollToMessage { .. } => "scroll_to_message",
            Self::ScrollToLatest => "scroll_to_latest",
            Self::OpenConversation { .. } => "open_conversation",
            Self::OpenUrl { .. } => "open_url",
            Self::Feedback(_) => "feedback",
            Self::Alert { .. } => "alert",
            Self::DispatchAck(_) => "dispatch_ack",
            Self::Error(_) => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: i32) -> MessageId {
        MessageId::new(PeerId(7), n)
    }

    #[test]
    fn message_index_orders_by_timestamp_then_id() {
        let early = MessageIndex::new(100, id(9));
        let late = MessageIndex::new(200, id(1));
        let same_second = MessageIndex::new(100, id(10));

        assert!(early < late);
        assert!(early < same_second);
        assert!(same_second < late);
    }

    #[test]
    fn hidden_or_empty_markup_is_not_visible() {
        let mut keyboard = KeyboardMessage {
            id: id(1),
            stable_version: 0,
            markup: Some(ReplyMarkup {
                rows: vec![vec!["Yes".into(), "No".into()]],
                hides_keyboard: false,
                single_use: false,
            }),
            requests_setup_reply: false,
        };
        assert!(keyboard.visible_markup().is_some());

        keyboard.markup = Some(ReplyMarkup {
            hides_keyboard: true,
            ..ReplyMarkup::default()
        });
        assert!(keyboard.visible_markup().is_none());

        keyboard.markup = Some(ReplyMarkup::default());
        assert!(keyboard.visible_markup().is_none());
    }

    #[test]
    fn cached_data_accessors_follow_peer_shape() {
        let channel = CachedPeerData::Channel {
            pinned_message_id: Some(id(3)),
            can_report: true,
        };
        assert_eq!(channel.pinned_message_id(), Some(id(3)));
        assert!(channel.can_report());
        assert!(!channel.is_blocked());

        let user = CachedPeerData::User {
            is_blocked: true,
            can_report: false,
        };
        assert_eq!(user.pinned_message_id(), None);
        assert!(user.is_blocked());
    }

    #[test]
    fn commands_round_trip_through_json() {
        let command = SessionCommand::NavigateToMessage {
            from: Some(id(1)),
            to: id(2),
            remember_in_stack: true,
        };
        let encoded = serde_json::to_string(&command).expect("encode");
        let decoded: SessionCommand = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, command);
    }
}
