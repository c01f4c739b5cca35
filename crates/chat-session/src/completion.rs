use chat_core::{
    ContextQueryResult, LinkPreview, MessageId, SessionError, SessionErrorCategory, SlotTicket,
};
use chat_platform::{CallbackAnswer, PlatformError, RecorderHandle};
use tokio::sync::mpsc;
use tracing::trace;

use crate::navigation::LookupOutcome;

/// Deferred result routed back onto the coordination task.
#[derive(Debug)]
pub enum Completion {
    ContextQuery {
        ticket: SlotTicket,
        result: Option<ContextQueryResult>,
    },
    UrlPreview {
        ticket: SlotTicket,
        preview: Option<LinkPreview>,
    },
    RecorderAcquired {
        ticket: SlotTicket,
        result: Result<RecorderHandle, PlatformError>,
    },
    Search {
        ticket: SlotTicket,
        found: Vec<MessageId>,
    },
    Lookup {
        ticket: SlotTicket,
        outcome: LookupOutcome,
    },
    Dispatch {
        client_txn_id: String,
        result: Result<Vec<MessageId>, PlatformError>,
    },
    ToastExpired {
        ticket: SlotTicket,
    },
    Callback {
        ticket: SlotTicket,
        answer: Result<CallbackAnswer, PlatformError>,
    },
}

pub type CompletionSender = mpsc::UnboundedSender<Completion>;

/// Slot delivery callback that wraps the value and posts it to the session.
pub(crate) fn forward<V, W>(
    completions: CompletionSender,
    wrap: W,
) -> impl FnOnce(SlotTicket, V) + Send + 'static
where
    V: 'static,
    W: FnOnce(SlotTicket, V) -> Completion + Send + 'static,
{
    move |ticket, value| {
        if completions.send(wrap(ticket, value)).is_err() {
            trace!("session already stopped; dropping completion");
        }
    }
}

pub(crate) fn map_platform_error(operation: &str, err: PlatformError) -> SessionError {
    match err {
        PlatformError::NotFound => SessionError::not_found(operation),
        PlatformError::Unavailable(message) => {
            SessionError::resource_unavailable(operation, message)
        }
        PlatformError::Backend(message) => SessionError::new(
            SessionErrorCategory::Internal,
            format!("{operation}_failed"),
            message,
        ),
    }
}
