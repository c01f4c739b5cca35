//! Core conversation-session contract shared by the coordinator and renderers.
//!
//! This crate defines the presentation snapshot and its pure derivations,
//! the single-slot side-effect primitive, navigation and search helpers, the
//! recording state machine, and the command/event protocol with its error
//! and channel abstractions.

/// Async command/event channel primitives.
pub mod channel;
/// Stable session error types.
pub mod error;
/// Navigation history of jumped-from positions.
pub mod history;
/// Input panel derivation (accessory icons, placeholder).
pub mod input_panel;
/// Bot keyboard reconciliation against the text input.
pub mod keyboard;
/// Event normalization helpers (dispatch acknowledgements).
pub mod normalization;
/// Context queries, link detection and entity extraction.
pub mod query;
/// Media recording state machine and its render projection.
pub mod recording;
/// In-chat search results and cursor navigation.
pub mod search;
/// Single-outstanding-request side-effect slot.
pub mod slot;
/// Presentation snapshot and persisted interface state.
pub mod state;
/// Title panel context set.
pub mod title_panel;
/// Protocol and domain types (ids, messages, commands, events).
pub mod types;
/// Materialized message window.
pub mod window;

pub use channel::{EventStream, SessionChannels};
pub use error::{SessionError, SessionErrorCategory};
pub use history::HistoryNavigationStack;
pub use input_panel::{AccessoryItem, InputPanelState, Placeholder, derive_input_panel};
pub use keyboard::reconcile_keyboard;
pub use normalization::{DispatchOutcome, classify_dispatch_error_message, normalize_dispatch_outcome};
pub use query::{
    BotCommand, ContextQuery, ContextQueryResult, InlineBot, InlineResult, context_query_for,
    detect_preview_url, text_entities, url_preview_key,
};
pub use recording::{
    MediaRecordingMode, MediaRecordingState, RecordingProjection, RecordingStateMachine,
    StopOutcome, VideoRecordingStatus,
};
pub use search::{SearchDirection, SearchResults, SearchState};
pub use slot::{Begin, PendingResolution, Resolution, SideEffectSlot, SlotTicket};
pub use state::{
    ComposeState, EditState, InputMode, InterfaceState, MessageActionsState, PresentationState,
    TextSelection, UrlPreview,
};
pub use title_panel::{TitlePanelContext, TitlePanelContexts, TitlePanelKind};
pub use types::{
    CachedPeerData, ChatHistoryState, DispatchAck, FeedbackKind, KeyboardMessage, LinkPreview,
    Message, MessageAttribute, MessageId, MessageIndex, OutgoingMedia, OutgoingMessage, PeerId,
    PeerKind, PeerSnapshot, ReplyMarkup, SessionCommand, SessionEvent, SessionTuning, TextEntity,
    TextEntityKind,
};
pub use window::{MessageWindow, WindowMergeError, WindowOp};
