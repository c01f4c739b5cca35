use crate::{
    error::SessionError,
    types::{DispatchAck, MessageId, SessionEvent},
};

/// Dispatch success/failure before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The sink accepted the messages and assigned ids.
    Success { message_ids: Vec<MessageId> },
    Failure { error: SessionError },
}

/// Convert a dispatch outcome to a stable `SessionEvent::DispatchAck`.
pub fn normalize_dispatch_outcome(
    client_txn_id: impl Into<String>,
    outcome: DispatchOutcome,
) -> SessionEvent {
    let client_txn_id = client_txn_id.into();
    match outcome {
        DispatchOutcome::Success { message_ids } => SessionEvent::DispatchAck(DispatchAck {
            client_txn_id,
            message_ids,
            error_code: None,
        }),
        DispatchOutcome::Failure { error } => SessionEvent::DispatchAck(DispatchAck {
            client_txn_id,
            message_ids: Vec::new(),
            error_code: Some(error.code),
        }),
    }
}

/// Convert a generic sink failure message to a dispatch-classified error.
pub fn classify_dispatch_error_message(message: impl Into<String>) -> SessionError {
    SessionError::dispatch_failed(message)
}
