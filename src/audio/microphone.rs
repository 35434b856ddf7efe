// Microphone capture device built on cpal.
//
// cpal streams are not Send, so the stream lives on a dedicated worker
// thread for the duration of the capture. PCM is buffered while active and
// the finished take is emitted as a single WAV-encoded fragment when the
// device is released.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::audio::capture::{CaptureDevice, CaptureEvent};
use crate::audio::format::MediaFormat;
use crate::error::{Error, Result};

const SUPPORTED_MIMES: &[&str] = &["audio/wav", "audio/x-wav"];

/// cpal-backed microphone device.
pub struct MicrophoneDevice {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl MicrophoneDevice {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl Default for MicrophoneDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CaptureDevice for MicrophoneDevice {
    async fn acquire(&mut self) -> Result<mpsc::Receiver<CaptureEvent>> {
        if self.worker.is_some() {
            return Err(Error::RecordingFailed("device already acquired".to_string()));
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::DeviceUnavailable("no default input device".to_string()))?;

        let supported = device
            .default_input_config()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

        let sample_format = supported.sample_format();
        let stream_config: cpal::StreamConfig = supported.into();
        let sample_rate = stream_config.sample_rate.0;
        let channels = stream_config.channels;

        info!(
            "Acquiring microphone: {}Hz, {} channels, {:?}",
            sample_rate, channels, sample_format
        );

        let (event_tx, event_rx) = mpsc::channel(8);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

        self.stop.store(false, Ordering::SeqCst);
        let stop = Arc::clone(&self.stop);

        let worker = std::thread::spawn(move || {
            capture_worker(
                device,
                stream_config,
                sample_format,
                stop,
                ready_tx,
                event_tx,
            );
        });

        // Suspends while the platform negotiates device access; permission
        // prompts resolve here.
        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(worker);
                info!("Microphone capture started");
                Ok(event_rx)
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(Error::RecordingFailed(
                    "capture worker exited before starting".to_string(),
                ))
            }
        }
    }

    async fn release(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        self.stop.store(true, Ordering::SeqCst);

        if worker.join().is_err() {
            return Err(Error::RecordingFailed("capture worker panicked".to_string()));
        }

        info!("Microphone released");

        Ok(())
    }

    fn supports(&self, format: &MediaFormat) -> bool {
        SUPPORTED_MIMES
            .iter()
            .any(|mime| mime.eq_ignore_ascii_case(format.mime()))
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

/// Owns the cpal stream for one capture window, then encodes and emits the
/// buffered PCM as a single WAV fragment followed by `Finalized`.
fn capture_worker(
    device: cpal::Device,
    stream_config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    stop: Arc<AtomicBool>,
    ready_tx: std::sync::mpsc::Sender<Result<()>>,
    event_tx: mpsc::Sender<CaptureEvent>,
) {
    let samples: Arc<Mutex<Vec<i16>>> = Arc::new(Mutex::new(Vec::new()));
    let err_fn = |e| warn!("Capture stream error: {}", e);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            let samples = Arc::clone(&samples);
            device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buffer) = samples.lock() {
                        buffer.extend(data.iter().map(|&s| {
                            (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
                        }));
                    }
                },
                err_fn,
                None,
            )
        }
        cpal::SampleFormat::I16 => {
            let samples = Arc::clone(&samples);
            device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buffer) = samples.lock() {
                        buffer.extend_from_slice(data);
                    }
                },
                err_fn,
                None,
            )
        }
        other => {
            let _ = ready_tx.send(Err(Error::DeviceUnavailable(format!(
                "unsupported sample format {:?}",
                other
            ))));
            return;
        }
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(map_build_error(e)));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(Error::RecordingFailed(e.to_string())));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(20));
    }

    // Stop delivering callbacks before reading the buffer out.
    drop(stream);

    let pcm = match samples.lock() {
        Ok(buffer) => buffer.clone(),
        Err(_) => {
            warn!("Sample buffer poisoned, discarding capture");
            let _ = event_tx.blocking_send(CaptureEvent::Finalized);
            return;
        }
    };

    match encode_wav(&pcm, stream_config.sample_rate.0, stream_config.channels) {
        Ok(bytes) => {
            info!("Captured {} samples ({} bytes WAV)", pcm.len(), bytes.len());
            let _ = event_tx.blocking_send(CaptureEvent::Chunk(bytes));
        }
        Err(e) => warn!("Failed to encode capture as WAV: {}", e),
    }

    let _ = event_tx.blocking_send(CaptureEvent::Finalized);
}

fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());

    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| Error::RecordingFailed(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::RecordingFailed(e.to_string()))?;
        }

        writer
            .finalize()
            .map_err(|e| Error::RecordingFailed(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

fn map_build_error(e: cpal::BuildStreamError) -> Error {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => {
            Error::DeviceUnavailable("input device went away".to_string())
        }
        cpal::BuildStreamError::BackendSpecific { err }
            if err.description.to_ascii_lowercase().contains("permission") =>
        {
            Error::PermissionDenied
        }
        other => Error::RecordingFailed(other.to_string()),
    }
}
