// Deterministic capture device for tests and offline runs: emits a
// configured fragment sequence instead of touching real hardware.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use crate::audio::capture::{CaptureDevice, CaptureEvent};
use crate::audio::format::MediaFormat;
use crate::error::{Error, Result};

/// How a scripted acquisition should fail, when it should.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    PermissionDenied,
    DeviceUnavailable,
}

/// In-memory capture device.
///
/// `acquire()` emits the scripted fragments in order, then waits for
/// `release()` before emitting `Finalized` and closing the channel --
/// the same channel discipline a real device follows.
pub struct ScriptedDevice {
    supported: Vec<String>,
    fragments: Vec<Vec<u8>>,
    fail_with: Option<ScriptedFailure>,
    stop_tx: Option<oneshot::Sender<()>>,
    emitter: Option<JoinHandle<()>>,
    releases: Arc<AtomicUsize>,
}

impl ScriptedDevice {
    /// Device that supports the given MIME types and will emit the given
    /// fragments, in order.
    pub fn new(supported: Vec<String>, fragments: Vec<Vec<u8>>) -> Self {
        Self {
            supported,
            fragments,
            fail_with: None,
            stop_tx: None,
            emitter: None,
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Device that negotiates `audio/wav` but whose `acquire()` fails with
    /// the given error.
    pub fn failing(failure: ScriptedFailure) -> Self {
        let mut device = Self::new(vec!["audio/wav".to_string()], Vec::new());
        device.fail_with = Some(failure);
        device
    }

    /// Counter of completed `release()` calls, observable after the device
    /// has been boxed and handed to a session.
    pub fn release_probe(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.releases)
    }
}

#[async_trait::async_trait]
impl CaptureDevice for ScriptedDevice {
    async fn acquire(&mut self) -> Result<mpsc::Receiver<CaptureEvent>> {
        if let Some(failure) = self.fail_with {
            return Err(match failure {
                ScriptedFailure::PermissionDenied => Error::PermissionDenied,
                ScriptedFailure::DeviceUnavailable => {
                    Error::DeviceUnavailable("scripted device is unavailable".to_string())
                }
            });
        }

        if self.stop_tx.is_some() {
            return Err(Error::RecordingFailed("device already acquired".to_string()));
        }

        let (event_tx, event_rx) = mpsc::channel(self.fragments.len() + 2);
        let (stop_tx, stop_rx) = oneshot::channel();
        let fragments = self.fragments.clone();

        let emitter = tokio::spawn(async move {
            for fragment in fragments {
                if event_tx.send(CaptureEvent::Chunk(fragment)).await.is_err() {
                    return;
                }
            }

            // Hold the stream open until the caller releases the device.
            let _ = stop_rx.await;
            let _ = event_tx.send(CaptureEvent::Finalized).await;
        });

        self.stop_tx = Some(stop_tx);
        self.emitter = Some(emitter);

        info!("Scripted capture device acquired");

        Ok(event_rx)
    }

    async fn release(&mut self) -> Result<()> {
        let Some(stop_tx) = self.stop_tx.take() else {
            return Ok(());
        };

        let _ = stop_tx.send(());

        if let Some(emitter) = self.emitter.take() {
            let _ = emitter.await;
        }

        self.releases.fetch_add(1, Ordering::SeqCst);
        info!("Scripted capture device released");

        Ok(())
    }

    fn supports(&self, format: &MediaFormat) -> bool {
        self.supported
            .iter()
            .any(|mime| mime.eq_ignore_ascii_case(format.mime()))
    }

    fn is_capturing(&self) -> bool {
        self.stop_tx.is_some()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
