//! Drives one conversation session through a scripted tour against the
//! in-memory platform and persists the interface state it leaves behind.

mod config;
mod logging;

use std::{sync::Arc, time::Duration};

use chat_core::{
    ContextQuery, ContextQueryResult, EventStream, InterfaceState, LinkPreview, Message,
    MessageId, PeerId, PeerKind, PeerSnapshot, SearchDirection, SessionChannels, SessionCommand,
    SessionEvent, WindowOp,
};
use chat_platform::{
    CachedResolver, CallbackAnswer, CapturingDispatchSink, InMemoryMessageStore, RecorderScript,
    ScriptedRecorderProvider, clear_interface_state, interface_state_path, load_interface_state,
    save_interface_state,
};
use chat_session::{SessionCollaborators, spawn_session};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use config::SmokeConfig;

const PEER: PeerId = PeerId(4_242);
const SEEDED_MESSAGES: i32 = 60;
const STEP_PAUSE: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() {
    logging::init();

    let config = match SmokeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            std::process::exit(2);
        }
    };

    if let Err(err) = run(config).await {
        error!(error = %err, "smoke run failed");
        std::process::exit(1);
    }
}

async fn run(config: SmokeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state_path = interface_state_path(&config.data_dir, PEER);
    if config.reset_state {
        clear_interface_state(&state_path)?;
    }
    let interface_state = match load_interface_state(&state_path) {
        Ok(Some(state)) => {
            info!(path = %state_path.display(), draft = %state.compose.text, "restored interface state");
            state
        }
        Ok(None) => InterfaceState::default(),
        Err(err) => {
            warn!(error = %err, "ignoring unreadable interface state");
            InterfaceState::default()
        }
    };

    let messages = seed_messages(&config);
    let dispatch = CapturingDispatchSink::default();
    dispatch.set_latency(config.platform_latency);
    let latency = config.platform_latency.unwrap_or(Duration::ZERO);
    let collaborators = SessionCollaborators {
        messages: Arc::new(messages.clone()),
        dispatch: Arc::new(dispatch.clone()),
        recorder: Arc::new(ScriptedRecorderProvider::new(RecorderScript {
            latency: config.platform_latency,
            ..RecorderScript::default()
        })),
        context_queries: Arc::new(CachedResolver::<ContextQuery, ContextQueryResult>::new(
            latency,
        )),
        link_previews: Arc::new(CachedResolver::<String, LinkPreview>::new(latency)),
    };

    let (handle, events) = spawn_session(
        peer(),
        interface_state,
        collaborators,
        config.tuning.clone(),
        SessionChannels::subscribe,
    );
    let printer = tokio::spawn(print_events(events));

    for command in script() {
        debug!(?command, "sending command");
        handle.send(command).await?;
        tokio::time::sleep(STEP_PAUSE).await;
    }
    // Let the scripted recorder and any delayed collaborators answer.
    tokio::time::sleep(Duration::from_millis(600)).await;
    handle.send(SessionCommand::FinishMediaRecording { send: true }).await?;
    handle
        .send(SessionCommand::SetComposeText {
            text: "draft kept for next time".into(),
            selection: None,
        })
        .await?;
    tokio::time::sleep(STEP_PAUSE).await;

    let final_state = handle.shutdown().await?;
    let event_count = printer.await?;
    save_interface_state(&state_path, &final_state)?;

    info!(
        events = event_count,
        enqueued = dispatch.enqueued().len(),
        edits = dispatch.edits().len(),
        path = %state_path.display(),
        "smoke run finished"
    );
    Ok(())
}

fn peer() -> PeerSnapshot {
    PeerSnapshot {
        id: PEER,
        title: "Forecast Desk".into(),
        address_name: Some("forecast_bot".into()),
        kind: PeerKind::User { is_bot: true },
    }
}

fn message(n: i32) -> Message {
    Message {
        id: MessageId::new(PEER, n),
        timestamp: 1_700_000_000 + (n as u32) * 60,
        author_id: Some(if n % 2 == 0 { PEER } else { PeerId(1) }),
        text: format!("message {n}"),
        stable_version: 0,
    }
}

fn seed_messages(config: &SmokeConfig) -> InMemoryMessageStore {
    let store = InMemoryMessageStore::default();
    for n in 1..=SEEDED_MESSAGES {
        store.insert(message(n));
    }
    store.set_unread_count(PEER, 1_250);
    store.set_callback_answer(
        MessageId::new(PEER, SEEDED_MESSAGES),
        CallbackAnswer::Toast("Subscribed to daily forecasts".into()),
    );
    store.set_latency(config.platform_latency);
    store
}

/// The tour: load the tail of the history, send, search, navigate, press a
/// button, edit and start a voice note.
fn script() -> Vec<SessionCommand> {
    let tail = (SEEDED_MESSAGES - 19..=SEEDED_MESSAGES)
        .map(|n| WindowOp::Insert(message(n)))
        .collect();
    let latest = MessageId::new(PEER, SEEDED_MESSAGES);

    vec![
        SessionCommand::ApplyWindowOps { ops: tail },
        SessionCommand::SetComposeText {
            text: "  weather in Lisbon?  ".into(),
            selection: None,
        },
        SessionCommand::SendText,
        SessionCommand::SendBotCommand {
            command: "/forecast".into(),
            bot_address: Some("forecast_bot".into()),
        },
        SessionCommand::BeginSearch,
        SessionCommand::UpdateSearchQuery {
            query: "message 1".into(),
        },
        SessionCommand::NavigateSearch {
            direction: SearchDirection::Earlier,
        },
        SessionCommand::DismissSearch,
        SessionCommand::NavigateToMessage {
            from: Some(latest),
            to: MessageId::new(PEER, 3),
            remember_in_stack: true,
        },
        SessionCommand::NavigateBack,
        SessionCommand::RequestMessageCallback {
            message_id: latest,
            data: b"subscribe".to_vec(),
        },
        SessionCommand::BeginEdit {
            message_id: MessageId::new(PEER, SEEDED_MESSAGES - 1),
            text: "message 59".into(),
        },
        SessionCommand::UpdateEditText {
            text: "message 59 (edited)".into(),
        },
        SessionCommand::SubmitEdit,
        SessionCommand::BeginMediaRecording { is_video: false },
        SessionCommand::LockMediaRecording,
    ]
}

async fn print_events(mut events: EventStream) -> usize {
    let mut count = 0;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "event printer lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        count += 1;
        match event {
            SessionEvent::StateUpdated(state) => debug!(
                draft = %state.interface_state.compose.text,
                history = ?state.history_state,
                loading = state.is_loading_message,
                badge = ?state.unread_badge,
                recording = ?state.recording,
                "state updated"
            ),
            SessionEvent::DispatchAck(ack) => info!(
                txn = %ack.client_txn_id,
                ids = ?ack.message_ids,
                error_code = ?ack.error_code,
                "dispatch acknowledged"
            ),
            SessionEvent::Error(err) => warn!(code = %err.code, message = %err.message, "session error"),
            other => info!(event = ?other, "session event"),
        }
    }
    count
}
