pub mod analysis;
pub mod artifact;
pub mod audio;
pub mod config;
pub mod error;
pub mod session;

pub use analysis::{AnalysisClient, AnalysisPrompt, PronunciationScore};
pub use artifact::{export_file_name, Artifact, ArtifactHandle, ArtifactStore};
pub use audio::{
    negotiate, CaptureDevice, CaptureEvent, MediaFormat, MicrophoneDevice, ScriptedDevice,
    ScriptedFailure,
};
pub use config::Config;
pub use error::{Error, Result};
pub use session::{RecordingSession, SessionConfig, SessionSnapshot, SessionState};
