//! Identification session management
//!
//! This module provides:
//! - `Session`: the Idle → Recording → Analyzing → Success/Error state machine
//! - `SessionController`: the task that owns the session, the capture
//!   service and the recognizer, driven through a `SessionHandle`

mod controller;
mod state;

pub use controller::{SessionController, SessionHandle, DEFAULT_CAPTURE_WINDOW};
pub use state::{
    ClipSummary, Session, SessionError, SessionSnapshot, SessionStatus, CONNECTIVITY_MESSAGE,
    NO_MATCH_MESSAGE,
};
