//! Recording session management
//!
//! This module provides the `RecordingSession` state machine that manages:
//! - Capture device acquisition and release
//! - Format negotiation and fragment buffering
//! - Artifact and handle lifetime across every exit path
//! - Submission to the external pronunciation scorer

mod config;
mod session;
mod state;

pub use config::SessionConfig;
pub use session::RecordingSession;
pub use state::{SessionSnapshot, SessionState};
