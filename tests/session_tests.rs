// Tests for the identification session state machine
//
// These drive `Session` directly, without the controller task.

use std::time::Duration;
use tunegem::recognition::RecognitionError;
use tunegem::session::{CONNECTIVITY_MESSAGE, NO_MATCH_MESSAGE};
use tunegem::{AudioClip, Session, SessionError, SessionStatus, SongRecord};

fn clip() -> AudioClip {
    AudioClip::from_encoded(vec![1, 2, 3, 4], "audio/wav", Duration::from_millis(500))
}

fn song() -> SongRecord {
    SongRecord {
        artist: "Daft Punk".to_string(),
        title: "Get Lucky".to_string(),
        genre: "Disco".to_string(),
        fun_fact: "Features Nile Rodgers".to_string(),
        confidence: 92.0,
        source_links: vec![],
    }
}

/// Idle → Recording → Analyzing, returning the clip handed to analysis
fn analyzing_session() -> Session {
    let mut session = Session::new();
    session.start().unwrap();
    assert!(session.capture_ended().unwrap().is_none());
    assert!(session.buffer_ready(clip()).unwrap().is_some());
    assert_eq!(session.status(), SessionStatus::Analyzing);
    session
}

#[test]
fn test_new_session_is_idle() {
    let session = Session::new();

    assert_eq!(session.status(), SessionStatus::Idle);
    assert_eq!(session.cycle(), 0);
    assert!(session.audio().is_none());
    assert!(session.result().is_none());
    assert!(session.error_message().is_none());
}

#[test]
fn test_start_enters_recording_and_bumps_cycle() {
    let mut session = Session::new();

    let cycle = session.start().unwrap();

    assert_eq!(cycle, 1);
    assert_eq!(session.status(), SessionStatus::Recording);
    assert!(session.snapshot().started_at.is_some());
}

#[test]
fn test_start_while_busy_is_rejected() {
    let mut session = Session::new();
    session.start().unwrap();

    assert_eq!(
        session.start(),
        Err(SessionError::Busy(SessionStatus::Recording))
    );

    let mut session = analyzing_session();
    assert_eq!(
        session.start(),
        Err(SessionError::Busy(SessionStatus::Analyzing))
    );
}

#[test]
fn test_start_after_result_needs_reset() {
    let mut session = analyzing_session();
    session.complete(Ok(Some(song()))).unwrap();

    assert_eq!(session.start(), Err(SessionError::NeedsReset));
}

#[test]
fn test_analysis_needs_both_end_of_capture_and_buffer() {
    // Buffer first, then the end-of-capture signal
    let mut session = Session::new();
    session.start().unwrap();

    assert!(session.buffer_ready(clip()).unwrap().is_none());
    assert_eq!(session.status(), SessionStatus::Recording);

    let to_analyze = session.capture_ended().unwrap();
    assert!(to_analyze.is_some());
    assert_eq!(session.status(), SessionStatus::Analyzing);
}

#[test]
fn test_analyzing_is_entered_once() {
    let mut session = analyzing_session();

    // Late duplicate signals are refused rather than restarting analysis
    assert!(session.capture_ended().is_err());
    assert!(session.buffer_ready(clip()).is_err());
    assert_eq!(session.status(), SessionStatus::Analyzing);
}

#[test]
fn test_cannot_skip_recording() {
    let mut session = Session::new();

    assert!(matches!(
        session.capture_ended(),
        Err(SessionError::InvalidTransition {
            from: SessionStatus::Idle,
            ..
        })
    ));
    assert!(session.buffer_ready(clip()).is_err());
    assert!(session.complete(Ok(Some(song()))).is_err());
    assert_eq!(session.status(), SessionStatus::Idle);
}

#[test]
fn test_cannot_complete_while_recording() {
    let mut session = Session::new();
    session.start().unwrap();

    assert!(session.complete(Ok(Some(song()))).is_err());
    assert_eq!(session.status(), SessionStatus::Recording);
}

#[test]
fn test_song_result_is_success() {
    let mut session = analyzing_session();

    let status = session.complete(Ok(Some(song()))).unwrap();

    assert_eq!(status, SessionStatus::Success);
    assert_eq!(session.result(), Some(&song()));
    assert!(session.error_message().is_none());
}

#[test]
fn test_no_result_is_no_match_error() {
    let mut session = analyzing_session();

    let status = session.complete(Ok(None)).unwrap();

    assert_eq!(status, SessionStatus::Error);
    assert_eq!(session.error_message(), Some(NO_MATCH_MESSAGE));
    assert!(session.result().is_none());
}

#[test]
fn test_recognition_failure_is_connectivity_error() {
    let mut session = analyzing_session();

    let status = session
        .complete(Err(RecognitionError::Transport("connection refused".to_string())))
        .unwrap();

    assert_eq!(status, SessionStatus::Error);
    assert_eq!(session.error_message(), Some(CONNECTIVITY_MESSAGE));
    assert!(session.result().is_none());
}

#[test]
fn test_capture_failure_keeps_its_message() {
    let mut session = Session::new();
    session.start().unwrap();

    session
        .capture_failed("Microphone access denied: blocked")
        .unwrap();

    assert_eq!(session.status(), SessionStatus::Error);
    assert_eq!(
        session.error_message(),
        Some("Microphone access denied: blocked")
    );
}

#[test]
fn test_capture_failure_overrides_analysis() {
    let mut session = analyzing_session();

    session.capture_failed("Audio stream failed: device unplugged").unwrap();

    assert_eq!(session.status(), SessionStatus::Error);
    assert_eq!(
        session.error_message(),
        Some("Audio stream failed: device unplugged")
    );
    assert!(session.result().is_none());

    // A result that settles afterwards is refused
    assert!(session.complete(Ok(Some(song()))).is_err());
    assert_eq!(session.status(), SessionStatus::Error);
    assert!(session.result().is_none());
}

#[test]
fn test_capture_failure_does_not_override_finished_cycle() {
    let mut session = analyzing_session();
    session.complete(Ok(Some(song()))).unwrap();

    assert!(session.capture_failed("late failure").is_err());
    assert_eq!(session.status(), SessionStatus::Success);
    assert!(session.error_message().is_none());
}

#[test]
fn test_reset_clears_everything() {
    let mut session = analyzing_session();
    session.complete(Ok(None)).unwrap();

    session.reset().unwrap();

    assert_eq!(session.status(), SessionStatus::Idle);
    assert!(session.audio().is_none());
    assert!(session.result().is_none());
    assert!(session.error_message().is_none());

    let snapshot = session.snapshot();
    assert!(snapshot.clip.is_none());
    assert!(snapshot.started_at.is_none());
}

#[test]
fn test_reset_while_busy_is_rejected() {
    let mut session = Session::new();
    session.start().unwrap();

    assert_eq!(
        session.reset(),
        Err(SessionError::Busy(SessionStatus::Recording))
    );
    assert_eq!(session.status(), SessionStatus::Recording);
}

#[test]
fn test_reset_when_idle_is_noop() {
    let mut session = Session::new();
    assert!(session.reset().is_ok());
    assert_eq!(session.status(), SessionStatus::Idle);
}

#[test]
fn test_new_cycle_after_reset() {
    let mut session = analyzing_session();
    session.complete(Ok(Some(song()))).unwrap();
    session.reset().unwrap();

    let cycle = session.start().unwrap();

    assert_eq!(cycle, 2);
    assert!(session.result().is_none());
    assert_eq!(session.status(), SessionStatus::Recording);
}

#[test]
fn test_snapshot_serializes_for_clients() {
    let mut session = analyzing_session();
    session.complete(Ok(Some(song()))).unwrap();

    let json = serde_json::to_value(session.snapshot()).unwrap();

    assert_eq!(json["status"], "SUCCESS");
    assert_eq!(json["cycle"], 1);
    assert_eq!(json["result"]["funFact"], "Features Nile Rodgers");
    assert_eq!(json["clip"]["mimeType"], "audio/wav");
    assert_eq!(json["clip"]["bytes"], 4);
    assert!(json["errorMessage"].is_null());
}
