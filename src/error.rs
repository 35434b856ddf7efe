use crate::session::SessionState;

/// Errors surfaced by the recording session and its collaborators.
///
/// Every failure path resolves to a well-defined session state before the
/// error reaches the caller: device and negotiation errors leave the
/// session in `Idle`, analysis errors leave it in `Reviewing` with the
/// artifact intact.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("no usable capture device: {0}")]
    DeviceUnavailable(String),

    #[error("none of the preferred formats is supported by the capture device")]
    NoSupportedFormat,

    #[error("recording failed: {0}")]
    RecordingFailed(String),

    #[error("playback failed: {0}")]
    PlaybackFailed(String),

    #[error("no recorded audio available")]
    NoArtifact,

    #[error("an analysis request is already in flight")]
    AlreadyInFlight,

    #[error("could not reach the analysis service: {0}")]
    TransportError(String),

    #[error("analysis service returned {status}: {message}")]
    ServerError { status: u16, message: String },

    #[error("analysis response is not a valid score: {0}")]
    MalformedResponse(String),

    #[error("{op} is not valid while the session is {state:?}")]
    InvalidState {
        op: &'static str,
        state: SessionState,
    },

    #[error("artifact storage error: {0}")]
    Storage(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
