use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::config::SessionConfig;
use super::state::{SessionSnapshot, SessionState};
use crate::analysis::{AnalysisClient, AnalysisPrompt, PronunciationScore};
use crate::artifact::{Artifact, ArtifactHandle, ArtifactStore};
use crate::audio::capture::{CaptureDevice, CaptureEvent};
use crate::audio::format::{negotiate, MediaFormat};
use crate::error::{Error, Result};

/// The recording-session lifecycle manager.
///
/// Owns the capture device, the chunk buffer, the artifact and its handle,
/// and drives `Idle -> Recording -> Reviewing -> Analyzing -> Scored`.
/// Methods take `&self` so a shared `Arc<RecordingSession>` can be driven
/// from UI-level intents; an operation invalid for the current state is
/// rejected synchronously, never queued.
pub struct RecordingSession {
    config: SessionConfig,
    device: Mutex<Box<dyn CaptureDevice>>,
    store: ArtifactStore,
    client: AnalysisClient,

    inner: Mutex<SessionInner>,

    /// Fragments captured in the current window, in emission order.
    chunks: Arc<Mutex<Vec<Vec<u8>>>>,

    /// Whole seconds recorded so far, incremented by the tick task.
    elapsed_seconds: Arc<AtomicU64>,

    /// Bumped by `reset()`; an analysis response carrying a stale
    /// generation is discarded instead of reviving the session.
    generation: AtomicU64,

    started_at: DateTime<Utc>,

    tick_task: Mutex<Option<JoinHandle<()>>>,
    collector_task: Mutex<Option<JoinHandle<()>>>,
}

/// State mutated only under the session lock.
struct SessionInner {
    state: SessionState,
    format: Option<MediaFormat>,
    artifact: Option<Artifact>,
    handle: Option<ArtifactHandle>,
    score: Option<PronunciationScore>,
    playing: bool,
}

impl RecordingSession {
    pub fn new(
        config: SessionConfig,
        device: Box<dyn CaptureDevice>,
        store: ArtifactStore,
        client: AnalysisClient,
    ) -> Self {
        info!("Creating recording session: {}", config.session_id);

        Self {
            config,
            device: Mutex::new(device),
            store,
            client,
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                format: None,
                artifact: None,
                handle: None,
                score: None,
                playing: false,
            }),
            chunks: Arc::new(Mutex::new(Vec::new())),
            elapsed_seconds: Arc::new(AtomicU64::new(0)),
            generation: AtomicU64::new(0),
            started_at: Utc::now(),
            tick_task: Mutex::new(None),
            collector_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Begin a new recording. Valid from `Idle` or `Reviewing`.
    ///
    /// Any previous artifact and its handle are released first, so at most
    /// one artifact is outstanding at a time. On device or permission
    /// failure the session is left in `Idle`.
    pub async fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;

        match inner.state {
            SessionState::Idle | SessionState::Reviewing => {}
            state => return Err(Error::InvalidState { op: "start", state }),
        }

        if let Some(mut handle) = inner.handle.take() {
            handle.release();
        }
        inner.artifact = None;
        inner.score = None;
        inner.playing = false;
        inner.format = None;

        // A failure past this point must leave the session idle.
        inner.state = SessionState::Idle;

        let mut device = self.device.lock().await;

        let format = negotiate(&self.config.preferred_formats, device.as_ref())?;

        let mut events = device.acquire().await?;
        drop(device);

        self.elapsed_seconds.store(0, Ordering::SeqCst);
        self.chunks.lock().await.clear();

        // Collector: drains the device channel into the chunk buffer until
        // the terminal Finalized signal.
        let chunks = Arc::clone(&self.chunks);
        let collector = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    CaptureEvent::Chunk(fragment) => {
                        chunks.lock().await.push(fragment);
                    }
                    CaptureEvent::Finalized => break,
                }
            }
        });

        let elapsed = Arc::clone(&self.elapsed_seconds);
        let tick = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                elapsed.fetch_add(1, Ordering::SeqCst);
            }
        });

        *self.collector_task.lock().await = Some(collector);
        *self.tick_task.lock().await = Some(tick);

        inner.format = Some(format);
        inner.state = SessionState::Recording;

        info!("Recording started: {}", self.config.session_id);

        Ok(())
    }

    /// Finish the capture window. Valid from `Recording`.
    ///
    /// Halts the tick, releases the device, drains the fragment sequence to
    /// its terminal signal, and concatenates the fragments -- in emission
    /// order, none dropped -- into one immutable artifact with exactly one
    /// live handle. Transitions to `Reviewing`.
    pub async fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if inner.state != SessionState::Recording {
            return Err(Error::InvalidState {
                op: "stop",
                state: inner.state,
            });
        }

        if let Some(tick) = self.tick_task.lock().await.take() {
            tick.abort();
        }

        if let Err(e) = self.device.lock().await.release().await {
            warn!("Capture device failed during finalization: {}", e);
            self.abandon_capture(&mut inner).await;
            return Err(e);
        }

        // The device has emitted Finalized; wait for the collector to see it.
        if let Some(collector) = self.collector_task.lock().await.take() {
            if let Err(e) = collector.await {
                error!("Chunk collector panicked: {}", e);
                self.abandon_capture(&mut inner).await;
                return Err(Error::RecordingFailed("chunk collector failed".to_string()));
            }
        }

        let fragments = std::mem::take(&mut *self.chunks.lock().await);
        let format = match inner.format.clone() {
            Some(format) => format,
            None => {
                self.abandon_capture(&mut inner).await;
                return Err(Error::RecordingFailed("no negotiated format".to_string()));
            }
        };

        let artifact = Artifact::new(fragments.concat(), format);

        let handle = match self.store.materialize(&artifact) {
            Ok(handle) => handle,
            Err(e) => {
                self.abandon_capture(&mut inner).await;
                return Err(Error::RecordingFailed(e.to_string()));
            }
        };

        info!(
            "Recording stopped: {} ({} fragments, {} bytes, {}s)",
            self.config.session_id,
            fragments.len(),
            artifact.len(),
            self.elapsed_seconds.load(Ordering::SeqCst)
        );

        inner.artifact = Some(artifact);
        inner.handle = Some(handle);
        inner.state = SessionState::Reviewing;

        Ok(())
    }

    /// Start playback of the recorded artifact. Valid from `Reviewing` or
    /// `Scored`; a handle that fails to decode surfaces `PlaybackFailed`
    /// and leaves the state unchanged.
    pub async fn play(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;

        match inner.state {
            SessionState::Reviewing | SessionState::Scored => {}
            state => return Err(Error::InvalidState { op: "play", state }),
        }

        let (Some(handle), Some(format)) = (inner.handle.as_ref(), inner.format.as_ref()) else {
            return Err(Error::NoArtifact);
        };

        handle.verify_playable(format)?;

        inner.playing = true;

        Ok(())
    }

    /// Pause playback. Valid from `Reviewing` or `Scored`.
    pub async fn pause(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;

        match inner.state {
            SessionState::Reviewing | SessionState::Scored => {}
            state => return Err(Error::InvalidState { op: "pause", state }),
        }

        if inner.handle.is_none() {
            return Err(Error::NoArtifact);
        }

        inner.playing = false;

        Ok(())
    }

    /// Submit the artifact to the external scorer. Valid from `Reviewing`.
    ///
    /// Invokes the analysis client exactly once. On success the session is
    /// `Scored` and the score is returned; on failure it returns to
    /// `Reviewing` with the artifact preserved so the user can retry
    /// without re-recording. A response that resolves after `reset()` is
    /// discarded and reported as `Ok(None)`.
    pub async fn submit_for_analysis(&self) -> Result<Option<PronunciationScore>> {
        let (artifact, generation) = {
            let mut inner = self.inner.lock().await;

            match inner.state {
                SessionState::Analyzing => return Err(Error::AlreadyInFlight),
                SessionState::Reviewing => {}
                state => {
                    return Err(Error::InvalidState {
                        op: "submit_for_analysis",
                        state,
                    })
                }
            }

            let Some(artifact) = inner.artifact.clone() else {
                return Err(Error::NoArtifact);
            };

            inner.state = SessionState::Analyzing;
            inner.playing = false;

            (artifact, self.generation.load(Ordering::SeqCst))
        };

        let prompt = AnalysisPrompt {
            language: self.config.language.clone(),
            target_text: self.config.target_text.clone(),
        };

        // The session lock is not held across the round-trip, so reset()
        // stays reachable while the request is in flight.
        let outcome = self.client.submit(&artifact, &prompt).await;

        let mut inner = self.inner.lock().await;

        if self.generation.load(Ordering::SeqCst) != generation {
            info!("Discarding analysis response that arrived after reset");
            return Ok(None);
        }

        match outcome {
            Ok(score) => {
                inner.score = Some(score);
                inner.state = SessionState::Scored;
                Ok(Some(score))
            }
            Err(e) => {
                warn!("Analysis failed, returning to review: {}", e);
                inner.state = SessionState::Reviewing;
                Err(e)
            }
        }
    }

    /// Go back to reviewing the same recording. Valid from `Scored`.
    pub async fn practice_again(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if inner.state != SessionState::Scored {
            return Err(Error::InvalidState {
                op: "practice_again",
                state: inner.state,
            });
        }

        inner.score = None;
        inner.playing = false;
        inner.state = SessionState::Reviewing;

        Ok(())
    }

    /// Tear the session down to `Idle`. Valid from any state.
    ///
    /// Stops any in-progress capture, releases the device if held, releases
    /// the artifact and its handle, and clears the score and elapsed
    /// counter. An analysis request still in flight is left to resolve; its
    /// response will be discarded.
    pub async fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let mut inner = self.inner.lock().await;

        if let Some(tick) = self.tick_task.lock().await.take() {
            tick.abort();
        }

        {
            let mut device = self.device.lock().await;
            if device.is_capturing() {
                if let Err(e) = device.release().await {
                    warn!("Failed to release capture device on reset: {}", e);
                }
            }
        }

        if let Some(collector) = self.collector_task.lock().await.take() {
            collector.abort();
        }

        self.chunks.lock().await.clear();
        self.elapsed_seconds.store(0, Ordering::SeqCst);

        if let Some(mut handle) = inner.handle.take() {
            handle.release();
        }
        inner.artifact = None;
        inner.score = None;
        inner.playing = false;
        inner.format = None;
        inner.state = SessionState::Idle;

        info!("Session reset: {}", self.config.session_id);
    }

    /// Save the recording under `dir` using the export naming scheme.
    /// Valid from `Reviewing` or `Scored`.
    pub async fn export(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let inner = self.inner.lock().await;

        match inner.state {
            SessionState::Reviewing | SessionState::Scored => {}
            state => return Err(Error::InvalidState { op: "export", state }),
        }

        let (Some(handle), Some(format)) = (inner.handle.as_ref(), inner.format.as_ref()) else {
            return Err(Error::NoArtifact);
        };

        handle.export_to(dir, &self.config.export_prefix, format)
    }

    /// Current state, for guard checks without a full snapshot.
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Point-in-time view of the session.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;

        SessionSnapshot {
            state: inner.state,
            started_at: self.started_at,
            elapsed_seconds: self.elapsed_seconds.load(Ordering::SeqCst),
            playing: inner.playing,
            has_artifact: inner.artifact.is_some(),
            has_handle: inner
                .handle
                .as_ref()
                .map(|h| !h.is_released())
                .unwrap_or(false),
            negotiated_mime: inner.format.as_ref().map(|f| f.mime().to_string()),
            score: inner.score,
        }
    }

    /// Unwind a capture that could not be finalized: drop everything from
    /// the window and resolve to `Idle`.
    async fn abandon_capture(&self, inner: &mut SessionInner) {
        if let Some(collector) = self.collector_task.lock().await.take() {
            collector.abort();
        }

        self.chunks.lock().await.clear();
        self.elapsed_seconds.store(0, Ordering::SeqCst);

        if let Some(mut handle) = inner.handle.take() {
            handle.release();
        }
        inner.artifact = None;
        inner.format = None;
        inner.playing = false;
        inner.state = SessionState::Idle;
    }
}
