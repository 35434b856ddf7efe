// Integration tests for the recording-session state machine: guarded
// transitions, artifact/handle lifetime across every exit path, and the
// analysis round-trip against a local mock scoring endpoint.

use std::fs;
use std::io::Cursor;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use serde_json::json;
use speakcheck::{
    AnalysisClient, ArtifactStore, Error, RecordingSession, ScriptedDevice, ScriptedFailure,
    SessionConfig, SessionState,
};
use tempfile::TempDir;

const ANALYZE_PATH: &str = "/api/analyze-pronunciation";

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock endpoint");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve mock endpoint");
    });

    format!("http://{}", addr)
}

fn scoring_ok() -> Router {
    Router::new().route(
        ANALYZE_PATH,
        post(|| async { Json(json!({ "articulation": 85, "prosody": 79, "overall": 82 })) }),
    )
}

fn scoring_overloaded() -> Router {
    Router::new().route(
        ANALYZE_PATH,
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "scorer overloaded" })),
            )
        }),
    )
}

fn scoring_slow() -> Router {
    Router::new().route(
        ANALYZE_PATH,
        post(|| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Json(json!({ "articulation": 85, "prosody": 79, "overall": 82 }))
        }),
    )
}

/// A small valid mono WAV, for playback tests.
fn wav_bytes(num_samples: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("create writer");
        for i in 0..num_samples {
            writer.write_sample((i % 100) as i16).expect("write sample");
        }
        writer.finalize().expect("finalize");
    }

    cursor.into_inner()
}

fn wav_device(fragments: Vec<Vec<u8>>) -> ScriptedDevice {
    ScriptedDevice::new(vec!["audio/wav".to_string()], fragments)
}

fn make_session(device: ScriptedDevice, base_url: &str, temp_dir: &TempDir) -> RecordingSession {
    let store = ArtifactStore::new(temp_dir.path().join("scratch")).expect("store");

    let config = SessionConfig {
        preferred_formats: vec![
            "audio/wav".to_string(),
            "audio/webm;codecs=opus".to_string(),
        ],
        ..SessionConfig::default()
    };

    RecordingSession::new(config, Box::new(device), store, AnalysisClient::new(base_url))
}

#[tokio::test]
async fn test_stop_concatenates_fragments_in_emission_order() {
    let temp_dir = TempDir::new().expect("temp dir");
    let fragments = vec![vec![1u8, 2], vec![3u8], vec![4u8, 5, 6]];
    let session = make_session(
        wav_device(fragments),
        "http://127.0.0.1:9",
        &temp_dir,
    );

    session.start().await.expect("start");
    assert_eq!(session.state().await, SessionState::Recording);

    session.stop().await.expect("stop");
    assert_eq!(session.state().await, SessionState::Reviewing);

    let exported = session
        .export(temp_dir.path().join("exports"))
        .await
        .expect("export");
    assert_eq!(
        fs::read(&exported).expect("read export"),
        vec![1, 2, 3, 4, 5, 6]
    );
}

#[tokio::test]
async fn test_reset_from_recording_releases_device_and_clears_everything() {
    let temp_dir = TempDir::new().expect("temp dir");
    let device = wav_device(vec![vec![1, 2, 3]]);
    let releases = device.release_probe();
    let session = make_session(device, "http://127.0.0.1:9", &temp_dir);

    session.start().await.expect("start");
    session.reset().await;

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, SessionState::Idle);
    assert_eq!(snapshot.elapsed_seconds, 0);
    assert!(!snapshot.has_artifact);
    assert!(!snapshot.has_handle);
    assert!(snapshot.score.is_none());
    assert!(snapshot.negotiated_mime.is_none());
    assert_eq!(releases.load(Ordering::SeqCst), 1, "device released on reset");
}

#[tokio::test]
async fn test_reset_from_reviewing_clears_artifact_and_handle() {
    let temp_dir = TempDir::new().expect("temp dir");
    let session = make_session(
        wav_device(vec![wav_bytes(800)]),
        "http://127.0.0.1:9",
        &temp_dir,
    );

    session.start().await.expect("start");
    session.stop().await.expect("stop");

    let snapshot = session.snapshot().await;
    assert!(snapshot.has_artifact && snapshot.has_handle);

    session.reset().await;

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(!snapshot.has_artifact);
    assert!(!snapshot.has_handle);
}

#[tokio::test]
async fn test_handle_exists_iff_artifact_exists() {
    let temp_dir = TempDir::new().expect("temp dir");
    let session = make_session(
        wav_device(vec![vec![1, 2, 3]]),
        "http://127.0.0.1:9",
        &temp_dir,
    );

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.has_artifact, snapshot.has_handle);

    session.start().await.expect("start");
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.has_artifact, snapshot.has_handle);
    assert!(!snapshot.has_artifact, "nothing owned while recording");

    session.stop().await.expect("stop");
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.has_artifact, snapshot.has_handle);
    assert!(snapshot.has_artifact);

    session.reset().await;
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.has_artifact, snapshot.has_handle);
    assert!(!snapshot.has_artifact);
}

#[tokio::test]
async fn test_invalid_transitions_are_rejected_synchronously() {
    let temp_dir = TempDir::new().expect("temp dir");
    let session = make_session(
        wav_device(vec![vec![1, 2, 3]]),
        "http://127.0.0.1:9",
        &temp_dir,
    );

    // Idle: only start (and reset) are valid.
    assert!(matches!(
        session.stop().await,
        Err(Error::InvalidState { op: "stop", .. })
    ));
    assert!(matches!(
        session.play().await,
        Err(Error::InvalidState { op: "play", .. })
    ));
    assert!(matches!(
        session.submit_for_analysis().await,
        Err(Error::InvalidState { .. })
    ));

    session.start().await.expect("start");

    // Recording: no nested start, no review operations.
    assert!(matches!(
        session.start().await,
        Err(Error::InvalidState { op: "start", .. })
    ));
    assert!(matches!(
        session.export(temp_dir.path()).await,
        Err(Error::InvalidState { op: "export", .. })
    ));

    session.stop().await.expect("stop");

    // Reviewing: practice_again needs a score first.
    assert!(matches!(
        session.practice_again().await,
        Err(Error::InvalidState { .. })
    ));

    // The rejections above left the machine where it was.
    assert_eq!(session.state().await, SessionState::Reviewing);
}

#[tokio::test]
async fn test_permission_denied_returns_to_idle() {
    let temp_dir = TempDir::new().expect("temp dir");
    let session = make_session(
        ScriptedDevice::failing(ScriptedFailure::PermissionDenied),
        "http://127.0.0.1:9",
        &temp_dir,
    );

    let result = session.start().await;
    assert!(matches!(result, Err(Error::PermissionDenied)));
    assert_eq!(session.state().await, SessionState::Idle);
}

#[tokio::test]
async fn test_device_unavailable_returns_to_idle() {
    let temp_dir = TempDir::new().expect("temp dir");
    let session = make_session(
        ScriptedDevice::failing(ScriptedFailure::DeviceUnavailable),
        "http://127.0.0.1:9",
        &temp_dir,
    );

    let result = session.start().await;
    assert!(matches!(result, Err(Error::DeviceUnavailable(_))));
    assert_eq!(session.state().await, SessionState::Idle);
}

#[tokio::test]
async fn test_no_supported_format_returns_to_idle() {
    let temp_dir = TempDir::new().expect("temp dir");
    let device = ScriptedDevice::new(vec!["audio/ogg".to_string()], Vec::new());
    let session = make_session(device, "http://127.0.0.1:9", &temp_dir);

    let result = session.start().await;
    assert!(matches!(result, Err(Error::NoSupportedFormat)));
    assert_eq!(session.state().await, SessionState::Idle);
}

#[tokio::test]
async fn test_negotiation_pins_second_preference_and_export_extension() {
    let temp_dir = TempDir::new().expect("temp dir");
    // Device supports only webm/opus; "audio/wav" is preferred but skipped.
    let device = ScriptedDevice::new(
        vec!["audio/webm;codecs=opus".to_string()],
        vec![vec![0x1A, 0x45, 0xDF, 0xA3]],
    );
    let session = make_session(device, "http://127.0.0.1:9", &temp_dir);

    session.start().await.expect("start");
    let snapshot = session.snapshot().await;
    assert_eq!(
        snapshot.negotiated_mime.as_deref(),
        Some("audio/webm;codecs=opus")
    );

    session.stop().await.expect("stop");
    let exported = session
        .export(temp_dir.path().join("exports"))
        .await
        .expect("export");
    assert_eq!(
        exported.extension().and_then(|e| e.to_str()),
        Some("webm"),
        "download extension derives from the negotiated format"
    );
}

#[tokio::test]
async fn test_play_and_pause_toggle_the_playback_flag() {
    let temp_dir = TempDir::new().expect("temp dir");
    let session = make_session(
        wav_device(vec![wav_bytes(1600)]),
        "http://127.0.0.1:9",
        &temp_dir,
    );

    session.start().await.expect("start");
    session.stop().await.expect("stop");

    session.play().await.expect("play");
    assert!(session.snapshot().await.playing);

    session.pause().await.expect("pause");
    assert!(!session.snapshot().await.playing);
}

#[tokio::test]
async fn test_playback_failure_leaves_state_unchanged() {
    let temp_dir = TempDir::new().expect("temp dir");
    // Fragments that do not decode as WAV.
    let session = make_session(
        wav_device(vec![vec![0xDE, 0xAD, 0xBE, 0xEF]]),
        "http://127.0.0.1:9",
        &temp_dir,
    );

    session.start().await.expect("start");
    session.stop().await.expect("stop");

    let result = session.play().await;
    assert!(matches!(result, Err(Error::PlaybackFailed(_))));

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, SessionState::Reviewing);
    assert!(!snapshot.playing);
    assert!(snapshot.has_artifact, "artifact untouched by a failed play");
}

#[tokio::test]
async fn test_submit_success_transitions_to_scored() {
    let temp_dir = TempDir::new().expect("temp dir");
    let base_url = serve(scoring_ok()).await;
    let session = make_session(wav_device(vec![wav_bytes(800)]), &base_url, &temp_dir);

    session.start().await.expect("start");
    session.stop().await.expect("stop");

    let score = session
        .submit_for_analysis()
        .await
        .expect("submit should succeed")
        .expect("score should not be discarded");

    assert_eq!(score.articulation, 85);
    assert_eq!(score.prosody, 79);
    assert_eq!(score.overall, 82);

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, SessionState::Scored);
    assert_eq!(snapshot.score, Some(score));
}

#[tokio::test]
async fn test_submit_failure_returns_to_reviewing_with_artifact_intact() {
    let temp_dir = TempDir::new().expect("temp dir");
    let base_url = serve(scoring_overloaded()).await;
    let session = make_session(wav_device(vec![wav_bytes(800)]), &base_url, &temp_dir);

    session.start().await.expect("start");
    session.stop().await.expect("stop");

    let result = session.submit_for_analysis().await;
    match result {
        Err(Error::ServerError { status, message }) => {
            assert_eq!(status, 500);
            assert!(message.contains("scorer overloaded"), "got: {}", message);
        }
        other => panic!("expected ServerError, got {:?}", other.map(|_| ())),
    }

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, SessionState::Reviewing);
    assert!(snapshot.has_artifact, "retry must not require re-recording");
    assert!(snapshot.has_handle);
}

#[tokio::test]
async fn test_submit_without_artifact_is_rejected() {
    let temp_dir = TempDir::new().expect("temp dir");
    let session = make_session(wav_device(Vec::new()), "http://127.0.0.1:9", &temp_dir);

    // Reaching Reviewing always carries an artifact, so the NoArtifact
    // guard is observable through the state guard from Idle.
    let result = session.submit_for_analysis().await;
    assert!(matches!(result, Err(Error::InvalidState { .. })));
}

#[tokio::test]
async fn test_second_submit_while_analyzing_is_already_in_flight() {
    let temp_dir = TempDir::new().expect("temp dir");
    let base_url = serve(scoring_slow()).await;
    let session = Arc::new(make_session(
        wav_device(vec![wav_bytes(800)]),
        &base_url,
        &temp_dir,
    ));

    session.start().await.expect("start");
    session.stop().await.expect("stop");

    let first = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.submit_for_analysis().await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(session.state().await, SessionState::Analyzing);

    let second = session.submit_for_analysis().await;
    assert!(matches!(second, Err(Error::AlreadyInFlight)));

    // The original request's transition is authoritative.
    let score = first
        .await
        .expect("task join")
        .expect("first submit should succeed")
        .expect("score should not be discarded");
    assert_eq!(score.overall, 82);
    assert_eq!(session.state().await, SessionState::Scored);
}

#[tokio::test]
async fn test_reset_during_analysis_discards_the_response() {
    let temp_dir = TempDir::new().expect("temp dir");
    let base_url = serve(scoring_slow()).await;
    let session = Arc::new(make_session(
        wav_device(vec![wav_bytes(800)]),
        &base_url,
        &temp_dir,
    ));

    session.start().await.expect("start");
    session.stop().await.expect("stop");

    let in_flight = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.submit_for_analysis().await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    session.reset().await;
    assert_eq!(session.state().await, SessionState::Idle);

    // The request resolves, but the session it belonged to is gone.
    let outcome = in_flight.await.expect("task join").expect("submit result");
    assert!(outcome.is_none(), "late response must be discarded");

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(snapshot.score.is_none());
    assert!(!snapshot.has_artifact);
}

#[tokio::test]
async fn test_practice_again_returns_to_reviewing_keeping_artifact() {
    let temp_dir = TempDir::new().expect("temp dir");
    let base_url = serve(scoring_ok()).await;
    let session = make_session(wav_device(vec![wav_bytes(800)]), &base_url, &temp_dir);

    session.start().await.expect("start");
    session.stop().await.expect("stop");
    session
        .submit_for_analysis()
        .await
        .expect("submit")
        .expect("score");

    session.practice_again().await.expect("practice again");

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, SessionState::Reviewing);
    assert!(snapshot.score.is_none());
    assert!(snapshot.has_artifact, "same take stays reviewable");
}

#[tokio::test]
async fn test_restart_releases_previous_artifact_first() {
    let temp_dir = TempDir::new().expect("temp dir");
    let device = wav_device(vec![wav_bytes(800)]);
    let releases = device.release_probe();
    let session = make_session(device, "http://127.0.0.1:9", &temp_dir);

    session.start().await.expect("start");
    session.stop().await.expect("stop");
    assert!(session.snapshot().await.has_artifact);

    // Re-recording from Reviewing drops the previous take before capture.
    session.start().await.expect("restart");
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.state, SessionState::Recording);
    assert!(!snapshot.has_artifact);
    assert!(!snapshot.has_handle);

    session.stop().await.expect("stop");
    assert!(session.snapshot().await.has_artifact);
    assert_eq!(releases.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_elapsed_seconds_tick_while_recording() {
    let temp_dir = TempDir::new().expect("temp dir");
    let session = make_session(
        wav_device(vec![vec![1, 2, 3]]),
        "http://127.0.0.1:9",
        &temp_dir,
    );

    session.start().await.expect("start");
    assert_eq!(session.snapshot().await.elapsed_seconds, 0);

    tokio::time::sleep(Duration::from_millis(2300)).await;
    let elapsed = session.snapshot().await.elapsed_seconds;
    assert!((2..=3).contains(&elapsed), "expected ~2s, got {}", elapsed);

    session.stop().await.expect("stop");
    session.reset().await;
    assert_eq!(session.snapshot().await.elapsed_seconds, 0);
}
