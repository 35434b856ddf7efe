use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::PronunciationScore;

/// Lifecycle states of a recording session.
///
/// `Idle -> Recording -> Reviewing -> Analyzing -> Scored`, with
/// `Reviewing` reachable again from `Scored` (practice-again) and `Idle`
/// reachable from any state via reset. There are no other states: every
/// failure path resolves to one of these before control returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// Nothing captured, nothing owned.
    Idle,
    /// Device held, fragments accumulating, tick running.
    Recording,
    /// A finished artifact with a live handle, ready to play or submit.
    Reviewing,
    /// One analysis request outstanding.
    Analyzing,
    /// Score received; artifact still available for replay.
    Scored,
}

/// Point-in-time view of a session, the observable surface for callers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,

    /// When the session was created.
    pub started_at: DateTime<Utc>,

    /// Whole seconds of recording so far (zero outside a capture window).
    pub elapsed_seconds: u64,

    /// Playback flag.
    pub playing: bool,

    /// Whether a finished artifact is owned right now.
    pub has_artifact: bool,

    /// Whether a live handle to that artifact exists. Invariant: equal to
    /// `has_artifact` at every observable point.
    pub has_handle: bool,

    /// MIME type pinned by format negotiation, while one is pinned.
    pub negotiated_mime: Option<String>,

    /// Score from the external scorer, once one has been received.
    pub score: Option<PronunciationScore>,
}
