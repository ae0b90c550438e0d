//! HTTP API for driving the identification session from another front end
//!
//! - GET /session - Current session snapshot
//! - POST /session/start - Start recording (10s window by default)
//! - POST /session/stop - Stop recording early
//! - POST /session/reset - Return to idle after a result or error
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
