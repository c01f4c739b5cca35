use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Message, MessageId, MessageIndex};

/// Incremental change to the materialized message window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum WindowOp {
    /// Insert at the position given by the message index.
    Insert(Message),
    /// Replace an existing message with the same id.
    Update(Message),
    Remove(MessageId),
    Clear,
}

/// Errors that can occur while applying window operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WindowMergeError {
    /// An operation referenced a message that is not present in the window.
    #[error("message {0:?} is not in the loaded window")]
    MissingMessage(MessageId),
}

/// Loaded slice of conversation history, ordered by [`MessageIndex`].
#[derive(Debug, Clone)]
pub struct MessageWindow {
    items: Vec<Message>,
    max_items: usize,
    anchor: Option<MessageIndex>,
}

impl MessageWindow {
    /// Create a window with an item cap (`max_items >= 1`).
    pub fn new(max_items: usize) -> Self {
        Self {
            items: Vec::new(),
            max_items: max_items.max(1),
            anchor: None,
        }
    }

    /// Current messages in ascending order.
    pub fn items(&self) -> &[Message] {
        &self.items
    }

    /// Position the reader is currently looking at.
    pub fn anchor(&self) -> Option<MessageIndex> {
        self.anchor
    }

    pub fn set_anchor(&mut self, anchor: Option<MessageIndex>) {
        self.anchor = anchor;
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.items.iter().find(|message| message.id == id)
    }

    pub fn index_of(&self, id: MessageId) -> Option<MessageIndex> {
        self.message(id).map(Message::index)
    }

    /// Swap in a freshly fetched window.
    pub fn replace(&mut self, mut messages: Vec<Message>) {
        messages.sort_by_key(Message::index);
        messages.dedup_by_key(|message| message.id);
        self.items = messages;
        self.trim_to_max();
    }

    /// Apply window operations in order.
    pub fn apply_ops(&mut self, ops: &[WindowOp]) -> Result<(), WindowMergeError> {
        for op in ops {
            match op {
                WindowOp::Insert(message) => {
                    self.items.retain(|existing| existing.id != message.id);
                    let position = self
                        .items
                        .partition_point(|existing| existing.index() < message.index());
                    self.items.insert(position, message.clone());
                }
                WindowOp::Update(message) => {
                    let existing = self
                        .items
                        .iter_mut()
                        .find(|existing| existing.id == message.id)
                        .ok_or(WindowMergeError::MissingMessage(message.id))?;
                    *existing = message.clone();
                }
                WindowOp::Remove(id) => {
                    let position = self
                        .items
                        .iter()
                        .position(|existing| existing.id == *id)
                        .ok_or(WindowMergeError::MissingMessage(*id))?;
                    self.items.remove(position);
                }
                WindowOp::Clear => self.items.clear(),
            }
            self.trim_to_max();
        }

        Ok(())
    }

    /// Clamp a requested history fetch size against the configured cap.
    ///
    /// The result is always in `1..=100`.
    pub fn bounded_fetch_count(requested: usize, cap: usize) -> usize {
        requested.max(1).min(cap.max(1)).min(100)
    }

    fn trim_to_max(&mut self) {
        if self.items.len() <= self.max_items {
            return;
        }

        let excess = self.items.len() - self.max_items;
        self.items.drain(0..excess);
    }
}
