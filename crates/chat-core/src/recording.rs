use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SessionError;

/// Preferred capture kind for the next recording.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum MediaRecordingMode {
    #[default]
    Audio,
    Video,
}

impl MediaRecordingMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Audio => Self::Video,
            Self::Video => Self::Audio,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VideoRecordingStatus {
    Recording,
    /// Capture stopped; the recorder holds the take for trimming.
    EditingAwaitingTrim,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaRecordingState {
    #[default]
    Idle,
    RecordingAudio {
        locked: bool,
    },
    RecordingVideo {
        status: VideoRecordingStatus,
        locked: bool,
    },
}

/// Read-only view of the recording rendered by the input panel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RecordingProjection {
    Audio {
        locked: bool,
        elapsed_ms: u64,
    },
    Video {
        status: VideoRecordingStatus,
        locked: bool,
        elapsed_ms: u64,
    },
}

/// Outcome of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The recorder can be released.
    Release,
    /// Keep the recorder alive for trimming.
    AwaitTrim,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingStateMachine {
    state: MediaRecordingState,
}

impl RecordingStateMachine {
    pub fn state(&self) -> MediaRecordingState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == MediaRecordingState::Idle
    }

    pub fn projection(&self, elapsed_ms: u64) -> Option<RecordingProjection> {
        match self.state {
            MediaRecordingState::Idle => None,
            MediaRecordingState::RecordingAudio { locked } => {
                Some(RecordingProjection::Audio { locked, elapsed_ms })
            }
            MediaRecordingState::RecordingVideo { status, locked } => {
                Some(RecordingProjection::Video {
                    status,
                    locked,
                    elapsed_ms,
                })
            }
        }
    }

    /// Enter the recording state once a recorder has been acquired.
    pub fn begin(&mut self, mode: MediaRecordingMode) -> Result<(), SessionError> {
        if !self.is_idle() {
            return Err(SessionError::invalid_state(self.state, "begin_recording"));
        }
        let next = match mode {
            MediaRecordingMode::Audio => MediaRecordingState::RecordingAudio { locked: false },
            MediaRecordingMode::Video => MediaRecordingState::RecordingVideo {
                status: VideoRecordingStatus::Recording,
                locked: false,
            },
        };
        self.transition(next);
        Ok(())
    }

    pub fn lock(&mut self) -> Result<(), SessionError> {
        let next = match self.state {
            MediaRecordingState::Idle => {
                return Err(SessionError::invalid_state(self.state, "lock_recording"));
            }
            MediaRecordingState::RecordingAudio { .. } => {
                MediaRecordingState::RecordingAudio { locked: true }
            }
            MediaRecordingState::RecordingVideo { status, .. } => {
                MediaRecordingState::RecordingVideo {
                    status,
                    locked: true,
                }
            }
        };
        self.transition(next);
        Ok(())
    }

    /// Apply a stop request.
    ///
    /// Audio keeps its state until finished. Video moves to trimming when
    /// the recorder reported `can_trim`, otherwise straight back to idle.
    pub fn stop(&mut self, can_trim: bool) -> Result<StopOutcome, SessionError> {
        match self.state {
            MediaRecordingState::RecordingAudio { .. } => Ok(StopOutcome::Release),
            MediaRecordingState::RecordingVideo {
                status: VideoRecordingStatus::Recording,
                locked,
            } => {
                if can_trim {
                    self.transition(MediaRecordingState::RecordingVideo {
                        status: VideoRecordingStatus::EditingAwaitingTrim,
                        locked,
                    });
                    Ok(StopOutcome::AwaitTrim)
                } else {
                    self.transition(MediaRecordingState::Idle);
                    Ok(StopOutcome::Release)
                }
            }
            MediaRecordingState::Idle
            | MediaRecordingState::RecordingVideo {
                status: VideoRecordingStatus::EditingAwaitingTrim,
                ..
            } => Err(SessionError::invalid_state(self.state, "stop_recording")),
        }
    }

    /// Return to idle, handing back the state that was finished.
    pub fn finish(&mut self) -> Result<MediaRecordingState, SessionError> {
        if self.is_idle() {
            return Err(SessionError::invalid_state(self.state, "finish_recording"));
        }
        let finished = self.state;
        self.transition(MediaRecordingState::Idle);
        Ok(finished)
    }

    /// Force idle, used on teardown.
    pub fn reset(&mut self) {
        if !self.is_idle() {
            self.transition(MediaRecordingState::Idle);
        }
    }

    fn transition(&mut self, next: MediaRecordingState) {
        debug!(from = ?self.state, to = ?next, "recording state transition");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionErrorCategory;

    #[test]
    fn audio_lifecycle_locks_and_finishes() {
        let mut machine = RecordingStateMachine::default();
        machine.begin(MediaRecordingMode::Audio).expect("begin from idle");
        machine.lock().expect("lock while recording");
        assert_eq!(
            machine.state(),
            MediaRecordingState::RecordingAudio { locked: true }
        );
        assert_eq!(
            machine.projection(1_200),
            Some(RecordingProjection::Audio {
                locked: true,
                elapsed_ms: 1_200
            })
        );

        let finished = machine.finish().expect("finish while recording");
        assert_eq!(finished, MediaRecordingState::RecordingAudio { locked: true });
        assert!(machine.is_idle());
        assert_eq!(machine.projection(0), None);
    }

    #[test]
    fn audio_stop_keeps_state_until_finish() {
        let mut machine = RecordingStateMachine::default();
        machine.begin(MediaRecordingMode::Audio).expect("begin");
        assert_eq!(machine.stop(false), Ok(StopOutcome::Release));
        assert_eq!(
            machine.state(),
            MediaRecordingState::RecordingAudio { locked: false }
        );
    }

    #[test]
    fn video_stop_moves_to_trim_when_supported() {
        let mut machine = RecordingStateMachine::default();
        machine.begin(MediaRecordingMode::Video).expect("begin");
        machine.lock().expect("lock");

        assert_eq!(machine.stop(true), Ok(StopOutcome::AwaitTrim));
        assert_eq!(
            machine.state(),
            MediaRecordingState::RecordingVideo {
                status: VideoRecordingStatus::EditingAwaitingTrim,
                locked: true
            }
        );
        assert!(machine.stop(true).is_err());
    }

    #[test]
    fn video_stop_without_trim_returns_to_idle() {
        let mut machine = RecordingStateMachine::default();
        machine.begin(MediaRecordingMode::Video).expect("begin");
        assert_eq!(machine.stop(false), Ok(StopOutcome::Release));
        assert!(machine.is_idle());
    }

    #[test]
    fn rejects_transitions_from_idle() {
        let mut machine = RecordingStateMachine::default();
        let err = machine.lock().expect_err("lock from idle must fail");
        assert_eq!(err.category, SessionErrorCategory::InvalidState);
        assert!(machine.finish().is_err());
        assert!(machine.stop(false).is_err());
    }

    #[test]
    fn rejects_second_begin() {
        let mut machine = RecordingStateMachine::default();
        machine.begin(MediaRecordingMode::Audio).expect("begin");
        assert!(machine.begin(MediaRecordingMode::Video).is_err());
    }

    #[test]
    fn mode_toggles_between_audio_and_video() {
        assert_eq!(MediaRecordingMode::Audio.toggled(), MediaRecordingMode::Video);
        assert_eq!(MediaRecordingMode::Video.toggled(), MediaRecordingMode::Audio);
    }
}
