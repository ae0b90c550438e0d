use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::audio::AudioClip;
use crate::recognition::{RecognitionError, SongRecord};

/// Shown when the model answered but found no song
pub const NO_MATCH_MESSAGE: &str =
    "Couldn't identify that song. Try getting closer to the audio source.";

/// Shown when the recognition service could not be reached or read
pub const CONNECTIVITY_MESSAGE: &str =
    "Failed to connect to the music knowledge base. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Idle,
    Recording,
    Analyzing,
    Success,
    Error,
}

impl SessionStatus {
    /// Success or Error: the cycle is over and only reset leaves it
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Success | SessionStatus::Error)
    }

    /// Recording or Analyzing: a new start must be refused
    pub fn is_busy(self) -> bool {
        matches!(self, SessionStatus::Recording | SessionStatus::Analyzing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Session is busy ({0:?}); wait for it to finish")]
    Busy(SessionStatus),

    #[error("Session has finished; reset it before starting again")]
    NeedsReset,

    #[error("Cannot {action} while {from:?}")]
    InvalidTransition {
        from: SessionStatus,
        action: &'static str,
    },

    #[error("Capture failed: {0}")]
    Capture(#[from] crate::audio::CaptureError),

    #[error("Session controller has shut down")]
    ControllerGone,
}

/// Summary of the captured clip for snapshots
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipSummary {
    pub mime_type: String,
    pub duration_secs: f64,
    pub bytes: usize,
}

/// Read-only view of the session published to front ends
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub cycle: u64,
    pub status: SessionStatus,
    pub result: Option<SongRecord>,
    pub error_message: Option<String>,
    pub clip: Option<ClipSummary>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// The record → analyze → result lifecycle of one identification attempt
///
/// Every mutation goes through a transition method; anything not listed in
/// the lifecycle is refused with `SessionError::InvalidTransition`.
#[derive(Debug, Clone)]
pub struct Session {
    cycle: u64,
    status: SessionStatus,
    audio: Option<AudioClip>,
    result: Option<SongRecord>,
    error_message: Option<String>,
    capture_ended: bool,
    started_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            cycle: 0,
            status: SessionStatus::Idle,
            audio: None,
            result: None,
            error_message: None,
            capture_ended: false,
            started_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn audio(&self) -> Option<&AudioClip> {
        self.audio.as_ref()
    }

    pub fn result(&self) -> Option<&SongRecord> {
        self.result.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Idle → Recording. Returns the new cycle number.
    pub fn start(&mut self) -> Result<u64, SessionError> {
        match self.status {
            SessionStatus::Idle => {}
            status if status.is_busy() => return Err(SessionError::Busy(status)),
            _ => return Err(SessionError::NeedsReset),
        }

        self.clear();
        self.cycle += 1;
        self.started_at = Some(Utc::now());
        self.set_status(SessionStatus::Recording);
        Ok(self.cycle)
    }

    /// Recording has stopped (timeout, manual stop, or end of input)
    ///
    /// Returns the clip to analyze if this completes the pair of conditions.
    pub fn capture_ended(&mut self) -> Result<Option<AudioClip>, SessionError> {
        self.expect_recording("end capture")?;
        self.capture_ended = true;
        Ok(self.try_begin_analysis())
    }

    /// The capture service produced the finalized clip
    ///
    /// Returns the clip to analyze if this completes the pair of conditions.
    /// A second clip in the same cycle is ignored.
    pub fn buffer_ready(&mut self, clip: AudioClip) -> Result<Option<AudioClip>, SessionError> {
        self.expect_recording("accept audio")?;
        if self.audio.is_none() {
            self.audio = Some(clip);
        }
        Ok(self.try_begin_analysis())
    }

    /// Analyzing → Success / Error depending on the recognition outcome
    pub fn complete(
        &mut self,
        outcome: Result<Option<SongRecord>, RecognitionError>,
    ) -> Result<SessionStatus, SessionError> {
        if self.status != SessionStatus::Analyzing {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                action: "complete analysis",
            });
        }

        match outcome {
            Ok(Some(song)) => {
                self.result = Some(song);
                self.set_status(SessionStatus::Success);
            }
            Ok(None) => {
                self.fail(NO_MATCH_MESSAGE.to_string());
            }
            Err(e) => {
                debug!("Recognition error in cycle {}: {}", self.cycle, e);
                self.fail(CONNECTIVITY_MESSAGE.to_string());
            }
        }

        Ok(self.status)
    }

    /// Capture failure: straight to Error with the capture's own message
    ///
    /// Overrides Idle, Recording and Analyzing. A finished cycle keeps its
    /// outcome.
    pub fn capture_failed(&mut self, message: impl Into<String>) -> Result<(), SessionError> {
        if self.status.is_terminal() {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                action: "report a capture failure",
            });
        }

        self.fail(message.into());
        Ok(())
    }

    /// Success / Error → Idle, clearing audio, result and error
    pub fn reset(&mut self) -> Result<(), SessionError> {
        match self.status {
            SessionStatus::Idle => Ok(()),
            status if status.is_busy() => Err(SessionError::Busy(status)),
            _ => {
                self.clear();
                self.started_at = None;
                self.set_status(SessionStatus::Idle);
                Ok(())
            }
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            cycle: self.cycle,
            status: self.status,
            result: self.result.clone(),
            error_message: self.error_message.clone(),
            clip: self.audio.as_ref().map(|clip| ClipSummary {
                mime_type: clip.mime_type().to_string(),
                duration_secs: clip.duration().as_secs_f64(),
                bytes: clip.len(),
            }),
            started_at: self.started_at,
            updated_at: self.updated_at,
        }
    }

    fn expect_recording(&self, action: &'static str) -> Result<(), SessionError> {
        if self.status == SessionStatus::Recording {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                from: self.status,
                action,
            })
        }
    }

    fn try_begin_analysis(&mut self) -> Option<AudioClip> {
        if !self.capture_ended {
            return None;
        }
        let clip = self.audio.clone()?;
        self.set_status(SessionStatus::Analyzing);
        Some(clip)
    }

    fn fail(&mut self, message: String) {
        self.result = None;
        self.error_message = Some(message);
        self.set_status(SessionStatus::Error);
    }

    fn clear(&mut self) {
        self.audio = None;
        self.result = None;
        self.error_message = None;
        self.capture_ended = false;
    }

    fn set_status(&mut self, status: SessionStatus) {
        info!("Session cycle {}: {:?} -> {:?}", self.cycle, self.status, status);
        self.status = status;
        self.updated_at = Utc::now();
    }
}
