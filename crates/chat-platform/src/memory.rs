use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Duration,
};

use chat_core::{Message, MessageId, MessageIndex, OutgoingMessage, PeerId, Resolution};
use tracing::debug;

use crate::{
    CallbackAnswer, DispatchSink, HistoryWindow, MessageStore, PlatformError, ReadState,
    respond_after,
};

#[derive(Default)]
struct StoreData {
    messages: BTreeMap<MessageIndex, Message>,
    muted: HashSet<PeerId>,
    unread: HashMap<PeerId, u32>,
    callback_answers: HashMap<MessageId, CallbackAnswer>,
    history_loading: bool,
    latency: Option<Duration>,
}

/// Message store backed by an ordered in-memory map.
///
/// With a latency configured every asynchronous lookup answers from a
/// background task after that delay; otherwise lookups answer immediately.
#[derive(Clone, Default)]
pub struct InMemoryMessageStore {
    data: Arc<RwLock<StoreData>>,
}

impl InMemoryMessageStore {
    pub fn insert(&self, message: Message) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.messages.retain(|_, existing| existing.id != message.id);
        data.messages.insert(message.index(), message);
    }

    pub fn set_muted(&self, peer_id: PeerId, muted: bool) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        if muted {
            data.muted.insert(peer_id);
        } else {
            data.muted.remove(&peer_id);
        }
    }

    pub fn set_unread_count(&self, peer_id: PeerId, unread_count: u32) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.unread.insert(peer_id, unread_count);
    }

    pub fn set_callback_answer(&self, message_id: MessageId, answer: CallbackAnswer) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.callback_answers.insert(message_id, answer);
    }

    /// Report history fetches as still loading.
    pub fn set_history_loading(&self, loading: bool) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.history_loading = loading;
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.latency = latency;
    }

    fn peer_messages(data: &StoreData, peer_id: PeerId) -> Vec<&Message> {
        data.messages
            .values()
            .filter(|message| message.id.peer_id == peer_id)
            .collect()
    }
}

impl MessageStore for InMemoryMessageStore {
    fn message(&self, id: MessageId) -> Option<Message> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.messages.values().find(|message| message.id == id).cloned()
    }

    fn history_window(&self, anchor: MessageId, count: usize) -> Resolution<HistoryWindow> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        if data.history_loading {
            return respond_after(data.latency, HistoryWindow::Loading);
        }

        let messages = Self::peer_messages(&data, anchor.peer_id);
        let count = count.max(1);
        let start = match messages.iter().position(|message| message.id == anchor) {
            Some(position) => position.saturating_sub(count / 2),
            // Unknown anchor: answer with the latest page, as a real store would.
            None => messages.len().saturating_sub(count),
        };
        let end = (start + count).min(messages.len());
        let window = messages[start..end]
            .iter()
            .map(|message| (*message).clone())
            .collect();
        debug!(?anchor, count, "serving history window");
        respond_after(data.latency, HistoryWindow::Loaded(window))
    }

    fn search(&self, peer_id: PeerId, query: &str) -> Resolution<Vec<MessageId>> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let needle = query.to_lowercase();
        let found = Self::peer_messages(&data, peer_id)
            .into_iter()
            .filter(|message| message.text.to_lowercase().contains(&needle))
            .map(|message| message.id)
            .collect();
        respond_after(data.latency, found)
    }

    fn message_at(&self, peer_id: PeerId, timestamp: u32) -> Resolution<Option<MessageId>> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let found = Self::peer_messages(&data, peer_id)
            .into_iter()
            .find(|message| message.timestamp >= timestamp)
            .map(|message| message.id);
        respond_after(data.latency, found)
    }

    fn read_state(&self, peer_id: PeerId) -> ReadState {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        ReadState {
            unread_count: data.unread.get(&peer_id).copied().unwrap_or(0),
        }
    }

    fn is_muted(&self, peer_id: PeerId) -> bool {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.muted.contains(&peer_id)
    }

    fn request_callback(
        &self,
        message_id: MessageId,
        _data: Vec<u8>,
    ) -> Resolution<Result<CallbackAnswer, PlatformError>> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let answer = data
            .callback_answers
            .get(&message_id)
            .cloned()
            .ok_or(PlatformError::NotFound);
        respond_after(data.latency, answer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRecord {
    pub message_id: MessageId,
    pub text: String,
}

#[derive(Default)]
struct SinkData {
    enqueued: Vec<(PeerId, Vec<OutgoingMessage>)>,
    edits: Vec<EditRecord>,
    next_id: i32,
    failure: Option<PlatformError>,
    latency: Option<Duration>,
}

/// Dispatch sink that records every call and assigns sequential ids.
#[derive(Clone, Default)]
pub struct CapturingDispatchSink {
    data: Arc<Mutex<SinkData>>,
}

impl CapturingDispatchSink {
    /// Fail every following call with `failure` until reset with `None`.
    pub fn fail_with(&self, failure: Option<PlatformError>) {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.failure = failure;
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.latency = latency;
    }

    /// Batches accepted so far, failed calls included.
    pub fn enqueued(&self) -> Vec<(PeerId, Vec<OutgoingMessage>)> {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.enqueued.clone()
    }

    pub fn edits(&self) -> Vec<EditRecord> {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.edits.clone()
    }
}

impl DispatchSink for CapturingDispatchSink {
    fn enqueue(
        &self,
        peer_id: PeerId,
        messages: Vec<OutgoingMessage>,
    ) -> Resolution<Result<Vec<MessageId>, PlatformError>> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        let count = messages.len();
        data.enqueued.push((peer_id, messages));
        let result = match data.failure.clone() {
            Some(failure) => Err(failure),
            None => {
                let first = data.next_id + 1;
                data.next_id += count as i32;
                Ok((first..=data.next_id)
                    .map(|id| MessageId::new(peer_id, id))
                    .collect())
            }
        };
        respond_after(data.latency, result)
    }

    fn edit(&self, message_id: MessageId, text: String) -> Resolution<Result<(), PlatformError>> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.edits.push(EditRecord { message_id, text });
        let result = match data.failure.clone() {
            Some(failure) => Err(failure),
            None => Ok(()),
        };
        respond_after(data.latency, result)
    }
}
