pub mod capture;
pub mod format;
pub mod microphone;
pub mod scripted;

pub use capture::{CaptureDevice, CaptureEvent};
pub use format::{negotiate, MediaFormat};
pub use microphone::MicrophoneDevice;
pub use scripted::{ScriptedDevice, ScriptedFailure};
