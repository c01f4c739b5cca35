//! Conversation session coordinator.
//!
//! A session owns the presentation snapshot of one open conversation and
//! serializes every change to it: renderer commands, collaborator answers and
//! recording progress all funnel through the same reducer. [`spawn_session`]
//! runs a session on its own task behind the command/event channels.

/// Title panel toasts and message-button callbacks.
pub mod alerts;
/// Background results routed back onto the session task.
pub mod completion;
/// Outgoing message assembly and acknowledgements.
pub mod dispatcher;
/// Message navigation across the materialized window.
pub mod navigation;
/// Recorder acquisition and capture lifecycle.
pub mod recording;
/// In-chat search.
pub mod search;
/// The session coordinator and its command handling.
pub mod session;
/// Presentation state reducer.
pub mod store;

use chat_core::{
    EventStream, InterfaceState, PeerSnapshot, SessionChannels, SessionCommand, SessionError,
    SessionErrorCategory, SessionTuning,
};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::warn;

pub use completion::Completion;
pub use navigation::{LookupKey, LookupOutcome};
pub use session::{ConversationSession, SessionCollaborators};
pub use store::PresentationStateStore;

/// Errors returned when talking to a spawned session.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The session task has exited and no longer reads commands.
    #[error("session is no longer running")]
    SessionStopped,
}

/// Handle to a session running on its own task.
pub struct SessionHandle {
    command_tx: mpsc::Sender<SessionCommand>,
    channels: SessionChannels,
    task: JoinHandle<InterfaceState>,
}

impl SessionHandle {
    /// Queue `command`; waits while the command buffer is full.
    pub async fn send(&self, command: SessionCommand) -> Result<(), ChannelError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| ChannelError::SessionStopped)
    }

    pub fn subscribe(&self) -> EventStream {
        self.channels.subscribe()
    }

    /// Stop the session and wait for the interface state it leaves behind.
    pub async fn shutdown(self) -> Result<InterfaceState, SessionError> {
        if self.send(SessionCommand::Shutdown).await.is_err() {
            warn!("session task already stopped");
        }
        self.task.await.map_err(|err| {
            SessionError::new(
                SessionErrorCategory::Internal,
                "session_task_failed",
                err.to_string(),
            )
        })
    }
}

/// Start a session for `peer` on a new task.
///
/// `on_start` subscribes before the first snapshot is published, so callers
/// that need it pass a subscription out of the closure.
pub fn spawn_session<F, T>(
    peer: PeerSnapshot,
    interface_state: InterfaceState,
    collaborators: SessionCollaborators,
    tuning: SessionTuning,
    on_start: F,
) -> (SessionHandle, T)
where
    F: FnOnce(&SessionChannels) -> T,
{
    let (command_tx, command_rx) = mpsc::channel(tuning.command_buffer.max(1));
    let channels = SessionChannels::new(tuning.event_buffer);
    let early = on_start(&channels);
    let session =
        ConversationSession::start(peer, interface_state, collaborators, tuning, channels.clone());
    let task = tokio::spawn(session.run(command_rx));

    (
        SessionHandle {
            command_tx,
            channels,
            task,
        },
        early,
    )
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use chat_core::{
        ContextQuery, ContextQueryResult, LinkPreview, PeerId, PeerKind, RecordingProjection,
        SessionEvent,
    };
    use chat_platform::{
        CachedResolver, CapturingDispatchSink, InMemoryMessageStore, RecorderScript,
        ScriptedRecorderProvider,
    };
    use tokio::time::timeout;

    use super::*;

    fn collaborators(recorder: ScriptedRecorderProvider) -> SessionCollaborators {
        SessionCollaborators {
            messages: Arc::new(InMemoryMessageStore::default()),
            dispatch: Arc::new(CapturingDispatchSink::default()),
            recorder: Arc::new(recorder),
            context_queries: Arc::new(CachedResolver::<ContextQuery, ContextQueryResult>::new(
                Duration::ZERO,
            )),
            link_previews: Arc::new(CachedResolver::<String, LinkPreview>::new(Duration::ZERO)),
        }
    }

    fn bot() -> PeerSnapshot {
        PeerSnapshot {
            id: PeerId(40),
            title: "Weather".into(),
            address_name: Some("weather_bot".into()),
            kind: PeerKind::User { is_bot: true },
        }
    }

    async fn next_event(events: &mut EventStream) -> SessionEvent {
        timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event should not time out")
            .expect("event stream should stay open")
    }

    #[tokio::test]
    async fn spawned_session_publishes_and_persists_on_shutdown() {
        let (handle, mut events) = spawn_session(
            bot(),
            InterfaceState::default(),
            collaborators(ScriptedRecorderProvider::new(RecorderScript::default())),
            SessionTuning::default(),
            SessionChannels::subscribe,
        );
        assert!(matches!(
            next_event(&mut events).await,
            SessionEvent::StateUpdated(_)
        ));

        handle
            .send(SessionCommand::SetComposeText {
                text: "forecast?".into(),
                selection: None,
            })
            .await
            .expect("command send should work");
        let SessionEvent::StateUpdated(state) = next_event(&mut events).await else {
            panic!("expected a state update");
        };
        assert_eq!(state.interface_state.compose.text, "forecast?");

        let persisted = handle.shutdown().await.expect("shutdown should work");
        assert_eq!(persisted.compose.text, "forecast?");
    }

    #[tokio::test]
    async fn command_errors_are_emitted_as_events() {
        let (handle, mut events) = spawn_session(
            bot(),
            InterfaceState::default(),
            collaborators(ScriptedRecorderProvider::new(RecorderScript::default())),
            SessionTuning::default(),
            SessionChannels::subscribe,
        );
        next_event(&mut events).await;

        handle
            .send(SessionCommand::StopMediaRecording)
            .await
            .expect("command send should work");
        let SessionEvent::Error(err) = next_event(&mut events).await else {
            panic!("expected an error event");
        };
        assert_eq!(err.code, "invalid_state_transition");

        handle.shutdown().await.expect("shutdown should work");
    }

    #[tokio::test]
    async fn commands_after_shutdown_are_rejected() {
        let (handle, _events) = spawn_session(
            bot(),
            InterfaceState::default(),
            collaborators(ScriptedRecorderProvider::new(RecorderScript::default())),
            SessionTuning::default(),
            SessionChannels::subscribe,
        );
        handle
            .send(SessionCommand::Shutdown)
            .await
            .expect("shutdown command should be queued");
        timeout(Duration::from_secs(2), async {
            while !handle.task.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("session task should stop");

        let err = handle
            .send(SessionCommand::BeginSearch)
            .await
            .expect_err("a stopped session takes no commands");
        assert!(matches!(err, ChannelError::SessionStopped));
    }

    #[tokio::test]
    async fn recording_progress_ticks_while_recording() {
        let tuning = SessionTuning {
            recording_tick_ms: 5,
            ..SessionTuning::default()
        };
        let recorder = ScriptedRecorderProvider::new(RecorderScript::default());
        let (handle, mut events) = spawn_session(
            bot(),
            InterfaceState::default(),
            collaborators(recorder.clone()),
            tuning,
            SessionChannels::subscribe,
        );
        next_event(&mut events).await;

        handle
            .send(SessionCommand::BeginMediaRecording { is_video: false })
            .await
            .expect("command send should work");
        let mut saw_recording = false;
        for _ in 0..4 {
            if let SessionEvent::StateUpdated(state) = next_event(&mut events).await
                && matches!(state.recording, Some(RecordingProjection::Audio { .. }))
            {
                saw_recording = true;
                break;
            }
        }
        assert!(saw_recording);

        handle.shutdown().await.expect("shutdown should work");
        assert_eq!(
            recorder.calls().last(),
            Some(&chat_platform::RecorderCall::Released)
        );
    }
}
