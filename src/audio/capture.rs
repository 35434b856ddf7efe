use tokio::sync::mpsc;

use crate::audio::format::MediaFormat;
use crate::error::Result;

/// One event emitted by an active capture device.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// One encoded media fragment, in emission order.
    Chunk(Vec<u8>),
    /// Terminal signal: no more fragments will follow. Carries no payload;
    /// the buffered fragments are the payload, held by the caller.
    Finalized,
}

/// Audio capture device adapter.
///
/// Wraps the platform capture primitive behind a uniform seam:
/// - `MicrophoneDevice`: cpal microphone input (all desktop platforms)
/// - `ScriptedDevice`: deterministic in-memory fragments (tests, offline runs)
#[async_trait::async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Request exclusive access to the input device and start capturing.
    ///
    /// Returns a channel receiver carrying the fragment sequence followed by
    /// a single `CaptureEvent::Finalized`. Fails with `PermissionDenied` or
    /// `DeviceUnavailable` when the platform denies access or has no device.
    async fn acquire(&mut self) -> Result<mpsc::Receiver<CaptureEvent>>;

    /// Stop capturing and give the device back.
    ///
    /// Causes `Finalized` to be emitted and the channel to close. Idempotent:
    /// calling it again (or without a successful acquire) is a no-op.
    async fn release(&mut self) -> Result<()>;

    /// Whether the device can encode into the given format.
    fn supports(&self, format: &MediaFormat) -> bool;

    /// Check if the device is currently capturing.
    fn is_capturing(&self) -> bool;

    /// Device name for logging.
    fn name(&self) -> &str;
}
