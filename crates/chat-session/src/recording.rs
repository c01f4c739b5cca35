//! Media recording coordination: recorder acquisition, capture lifecycle and
//! the outgoing message built from a finished take.

use std::{sync::Arc, time::Duration};

use chat_core::{
    Begin, FeedbackKind, MediaRecordingMode, MediaRecordingState, OutgoingMedia, OutgoingMessage,
    RecordingStateMachine, SessionChannels, SessionError, SessionEvent, SideEffectSlot,
    SlotTicket, StopOutcome, VideoRecordingStatus,
};
use chat_platform::{PlatformError, RecordedAudio, RecordedVideo, RecorderHandle, RecorderProvider};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    completion::{Completion, CompletionSender, forward, map_platform_error},
    store::PresentationStateStore,
};

/// Voice notes shorter than this are treated as accidental taps.
const MIN_VOICE_NOTE: Duration = Duration::from_millis(500);
const VOICE_NOTE_MIME: &str = "audio/ogg";

pub struct MediaRecordingCoordinator {
    machine: RecordingStateMachine,
    recorder: Option<RecorderHandle>,
    acquisition: SideEffectSlot<MediaRecordingMode, Result<RecorderHandle, PlatformError>>,
    provider: Arc<dyn RecorderProvider>,
    completions: CompletionSender,
    channels: SessionChannels,
}

impl MediaRecordingCoordinator {
    pub fn new(
        provider: Arc<dyn RecorderProvider>,
        completions: CompletionSender,
        channels: SessionChannels,
    ) -> Self {
        Self {
            machine: RecordingStateMachine::default(),
            recorder: None,
            acquisition: SideEffectSlot::new("recorder_acquisition"),
            provider,
            completions,
            channels,
        }
    }

    pub fn state(&self) -> MediaRecordingState {
        self.machine.state()
    }

    /// Recording, or waiting for a recorder to be handed over.
    pub fn is_active(&self) -> bool {
        !self.machine.is_idle() || self.acquisition.is_pending()
    }

    pub fn begin(
        &mut self,
        store: &mut PresentationStateStore,
        is_video: bool,
    ) -> Result<(), SessionError> {
        if self.is_active() {
            return Err(SessionError::invalid_state(
                self.machine.state(),
                "begin_recording",
            ));
        }

        let mode = if is_video {
            MediaRecordingMode::Video
        } else {
            MediaRecordingMode::Audio
        };
        let provider = Arc::clone(&self.provider);
        let begin = self.acquisition.begin(
            mode,
            move |mode| provider.acquire(*mode),
            forward(self.completions.clone(), |ticket, result| {
                Completion::RecorderAcquired { ticket, result }
            }),
        );
        match begin {
            Begin::Immediate(result) => self.on_acquired(store, result),
            Begin::Pending(_) => {
                debug!(?mode, "waiting for recorder");
                Ok(())
            }
        }
    }

    /// Deliver a recorder acquired in the background.
    pub fn complete_acquisition(
        &mut self,
        store: &mut PresentationStateStore,
        ticket: SlotTicket,
        result: Result<RecorderHandle, PlatformError>,
    ) -> Result<(), SessionError> {
        if !self.acquisition.accept(ticket) {
            // Dropping a late handle releases the device.
            return Ok(());
        }
        self.on_acquired(store, result)
    }

    fn on_acquired(
        &mut self,
        store: &mut PresentationStateStore,
        result: Result<RecorderHandle, PlatformError>,
    ) -> Result<(), SessionError> {
        let mut handle = result.map_err(|err| {
            warn!(%err, "recorder acquisition failed");
            map_platform_error("recorder", err)
        })?;
        let mode = handle.mode();
        self.machine.begin(mode)?;
        handle.start();
        self.recorder = Some(handle);
        info!(?mode, "recording started");
        self.channels.emit(SessionEvent::Feedback(FeedbackKind::Tap));
        self.publish(store);
        Ok(())
    }

    pub fn lock(&mut self, store: &mut PresentationStateStore) -> Result<(), SessionError> {
        self.machine.lock()?;
        if let Some(RecorderHandle::Video(recorder)) = self.recorder.as_mut() {
            recorder.lock();
        }
        debug!("recording locked");
        self.publish(store);
        Ok(())
    }

    pub fn stop(&mut self, store: &mut PresentationStateStore) -> Result<(), SessionError> {
        match self.machine.state() {
            MediaRecordingState::RecordingAudio { .. }
            | MediaRecordingState::RecordingVideo {
                status: VideoRecordingStatus::Recording,
                ..
            } => {}
            other => return Err(SessionError::invalid_state(other, "stop_recording")),
        }

        let can_trim = match self.recorder.as_mut() {
            Some(RecorderHandle::Audio(recorder)) => {
                recorder.stop();
                false
            }
            Some(RecorderHandle::Video(recorder)) => recorder.stop_soft(),
            None => false,
        };
        match self.machine.stop(can_trim)? {
            StopOutcome::Release => {
                debug!("recording stopped; releasing recorder");
                self.recorder = None;
            }
            StopOutcome::AwaitTrim => debug!("video take kept for trimming"),
        }
        self.publish(store);
        Ok(())
    }

    /// Leave the recording state; with `send` the take becomes an outgoing message.
    pub fn finish(
        &mut self,
        store: &mut PresentationStateStore,
        send: bool,
    ) -> Result<Option<OutgoingMessage>, SessionError> {
        if self.machine.is_idle() {
            if self.acquisition.is_pending() {
                self.acquisition.cancel();
                debug!("recording finished before the recorder arrived");
                return Ok(None);
            }
            return Err(SessionError::invalid_state(
                self.machine.state(),
                "finish_recording",
            ));
        }

        let finished = self.machine.finish()?;
        let outgoing = match self.recorder.take() {
            Some(RecorderHandle::Audio(mut recorder)) => {
                recorder.stop();
                let take = recorder.take_recorded();
                if send { self.voice_note(take) } else { None }
            }
            Some(RecorderHandle::Video(mut recorder)) => {
                if send {
                    recorder.complete().map(instant_video)
                } else {
                    recorder.discard();
                    None
                }
            }
            None => {
                debug!(?finished, "recorder already released; nothing to send");
                None
            }
        };
        info!(send, queued = outgoing.is_some(), "recording finished");
        self.publish(store);
        Ok(outgoing)
    }

    /// Flip the preferred mode; only allowed while idle.
    pub fn switch_mode(
        &mut self,
        store: &mut PresentationStateStore,
    ) -> Result<MediaRecordingMode, SessionError> {
        if self.is_active() {
            return Err(SessionError::invalid_state(
                self.machine.state(),
                "switch_recording_mode",
            ));
        }
        let state = store.apply(|state| {
            state.with_interface_state(|interface| {
                interface.media_recording_mode = interface.media_recording_mode.toggled();
            })
        });
        Ok(state.interface_state.media_recording_mode)
    }

    /// Re-publish the projection with the recorder's current elapsed time.
    pub fn refresh_progress(&mut self, store: &mut PresentationStateStore) {
        if !self.machine.is_idle() {
            self.publish(store);
        }
    }

    pub fn shutdown(&mut self) {
        self.acquisition.cancel();
        match self.recorder.take() {
            Some(RecorderHandle::Audio(mut recorder)) => recorder.stop(),
            Some(RecorderHandle::Video(mut recorder)) => recorder.discard(),
            None => {}
        }
        self.machine.reset();
    }

    fn publish(&self, store: &mut PresentationStateStore) {
        let elapsed_ms = self
            .recorder
            .as_ref()
            .map(|recorder| recorder.elapsed().as_millis() as u64)
            .unwrap_or(0);
        let projection = self.machine.projection(elapsed_ms);
        if store.current().recording != projection {
            store.apply(|state| state.with_recording(projection));
        }
    }

    fn voice_note(&self, take: Option<RecordedAudio>) -> Option<OutgoingMessage> {
        let take = take?;
        if take.duration < MIN_VOICE_NOTE {
            debug!(
                duration_ms = take.duration.as_millis() as u64,
                "discarding accidental short take"
            );
            self.channels.emit(SessionEvent::Feedback(FeedbackKind::Error));
            return None;
        }
        Some(OutgoingMessage {
            media: Some(OutgoingMedia::VoiceNote {
                resource_id: Uuid::new_v4(),
                mime_type: VOICE_NOTE_MIME.to_owned(),
                data: take.data,
                duration_secs: whole_seconds(take.duration),
                waveform: take.waveform,
            }),
            ..OutgoingMessage::default()
        })
    }
}

fn instant_video(take: RecordedVideo) -> OutgoingMessage {
    OutgoingMessage {
        media: Some(OutgoingMedia::InstantVideo {
            resource_id: Uuid::new_v4(),
            data: take.data,
            duration_secs: whole_seconds(take.duration),
        }),
        ..OutgoingMessage::default()
    }
}

fn whole_seconds(duration: Duration) -> u32 {
    u32::try_from(duration.as_secs()).unwrap_or(u32::MAX)
}
