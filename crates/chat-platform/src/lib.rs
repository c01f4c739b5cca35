//! Capabilities the conversation session consumes from its host.
//!
//! Every lookup returns a [`Resolution`] so implementations can answer from a
//! local cache within the calling frame or defer to a background worker.

use std::time::Duration;

use chat_core::{
    ContextQuery, ContextQueryResult, LinkPreview, MediaRecordingMode, Message, MessageId,
    OutgoingMessage, PeerId, Resolution,
};
use thiserror::Error;

/// In-memory message store and capturing dispatch sink.
pub mod memory;
/// File-backed interface state persistence.
pub mod persistence;
/// Scripted recorders and resolvers for demos and tests.
pub mod scripted;

pub use memory::{CapturingDispatchSink, EditRecord, InMemoryMessageStore};
pub use persistence::{
    clear_interface_state, interface_state_path, load_interface_state, save_interface_state,
};
pub use scripted::{
    CachedResolver, GatedResolver, RecorderCall, RecorderScript, ScriptedRecorderProvider,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("requested entity not found")]
    NotFound,
    #[error("platform resource unavailable: {0}")]
    Unavailable(String),
    #[error("platform backend failure: {0}")]
    Backend(String),
}

/// Result of a windowed history fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryWindow {
    /// The store is still syncing and cannot answer yet.
    Loading,
    Loaded(Vec<Message>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadState {
    pub unread_count: u32,
}

/// Bot answer to a message button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAnswer {
    None,
    Toast(String),
    Alert(String),
    OpenUrl(String),
}

pub trait MessageStore: Send + Sync {
    fn message(&self, id: MessageId) -> Option<Message>;

    /// Fetch about `count` messages centred on `anchor`.
    fn history_window(&self, anchor: MessageId, count: usize) -> Resolution<HistoryWindow>;

    fn search(&self, peer_id: PeerId, query: &str) -> Resolution<Vec<MessageId>>;

    /// First message sent at or after `timestamp`.
    fn message_at(&self, peer_id: PeerId, timestamp: u32) -> Resolution<Option<MessageId>>;

    fn read_state(&self, peer_id: PeerId) -> ReadState;

    fn is_muted(&self, peer_id: PeerId) -> bool;

    fn request_callback(
        &self,
        message_id: MessageId,
        data: Vec<u8>,
    ) -> Resolution<Result<CallbackAnswer, PlatformError>>;
}

pub trait DispatchSink: Send + Sync {
    /// Enqueue messages in order; returns the ids assigned to them.
    fn enqueue(
        &self,
        peer_id: PeerId,
        messages: Vec<OutgoingMessage>,
    ) -> Resolution<Result<Vec<MessageId>, PlatformError>>;

    fn edit(&self, message_id: MessageId, text: String) -> Resolution<Result<(), PlatformError>>;
}

pub trait ContextQueryResolver: Send + Sync {
    fn resolve(&self, query: &ContextQuery) -> Resolution<Option<ContextQueryResult>>;
}

pub trait LinkPreviewResolver: Send + Sync {
    fn resolve(&self, url: &str) -> Resolution<Option<LinkPreview>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAudio {
    pub data: Vec<u8>,
    pub duration: Duration,
    pub waveform: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedVideo {
    pub data: Vec<u8>,
    pub duration: Duration,
}

/// Microphone capture handle. Dropping it releases the device.
pub trait AudioRecorder: Send {
    fn start(&mut self);
    fn stop(&mut self);
    fn elapsed(&self) -> Duration;
    /// Hand over the captured take; `None` when nothing was recorded.
    fn take_recorded(&mut self) -> Option<RecordedAudio>;
}

/// Camera capture handle. Dropping it releases the device.
pub trait VideoRecorder: Send {
    fn start(&mut self);
    fn lock(&mut self);
    /// Stop capture; `true` when the take can be trimmed before sending.
    fn stop_soft(&mut self) -> bool;
    /// Finalize the take for sending.
    fn complete(&mut self) -> Option<RecordedVideo>;
    fn discard(&mut self);
    fn elapsed(&self) -> Duration;
}

pub enum RecorderHandle {
    Audio(Box<dyn AudioRecorder>),
    Video(Box<dyn VideoRecorder>),
}

impl RecorderHandle {
    pub fn mode(&self) -> MediaRecordingMode {
        match self {
            Self::Audio(_) => MediaRecordingMode::Audio,
            Self::Video(_) => MediaRecordingMode::Video,
        }
    }

    pub fn start(&mut self) {
        match self {
            Self::Audio(recorder) => recorder.start(),
            Self::Video(recorder) => recorder.start(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Audio(recorder) => recorder.elapsed(),
            Self::Video(recorder) => recorder.elapsed(),
        }
    }
}

impl std::fmt::Debug for RecorderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecorderHandle::{:?}", self.mode())
    }
}

pub trait RecorderProvider: Send + Sync {
    fn acquire(&self, mode: MediaRecordingMode) -> Resolution<Result<RecorderHandle, PlatformError>>;
}

/// Answer with `value` now, or after `latency` from a background task.
pub fn respond_after<V: Send + 'static>(latency: Option<Duration>, value: V) -> Resolution<V> {
    match latency {
        None => Resolution::Immediate(value),
        Some(latency) => Resolution::pending(async move {
            tokio::time::sleep(latency).await;
            value
        }),
    }
}
