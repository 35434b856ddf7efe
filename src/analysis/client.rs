use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::multipart::{Form, Part};
use tracing::{info, warn};

use super::score::{PronunciationScore, RawScore};
use crate::artifact::Artifact;
use crate::error::{Error, Result};

const ANALYZE_PATH: &str = "/api/analyze-pronunciation";

/// Optional context sent alongside the audio: the practice language and
/// the sentence the speaker was reading.
#[derive(Debug, Clone, Default)]
pub struct AnalysisPrompt {
    pub language: Option<String>,
    pub target_text: Option<String>,
}

/// Client for the external pronunciation scoring endpoint.
///
/// Packages the artifact as a single-part upload and maps transport and
/// HTTP outcomes to domain results. At most one request may be outstanding
/// at a time; a second `submit` before the first resolves is rejected with
/// `AlreadyInFlight`.
pub struct AnalysisClient {
    http: reqwest::Client,
    base_url: String,
    in_flight: AtomicBool,
}

impl AnalysisClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Self {
            http: reqwest::Client::new(),
            base_url,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Submit the artifact for scoring. Exactly one request per call.
    pub async fn submit(
        &self,
        artifact: &Artifact,
        prompt: &AnalysisPrompt,
    ) -> Result<PronunciationScore> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyInFlight);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let file_name = artifact.format().file_name("recording");
        let part = Part::bytes(artifact.bytes().to_vec())
            .file_name(file_name)
            .mime_str(artifact.format().mime())
            .map_err(|e| Error::TransportError(format!("invalid artifact MIME: {}", e)))?;

        let mut form = Form::new().part("audioFile", part);
        if let Some(lang) = &prompt.language {
            form = form.text("lang", lang.clone());
        }
        if let Some(text) = &prompt.target_text {
            form = form.text("text", text.clone());
        }

        let url = format!("{}{}", self.base_url, ANALYZE_PATH);
        info!("Submitting {} byte artifact to {}", artifact.len(), url);

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::TransportError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = extract_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

            warn!("Analysis endpoint returned {}: {}", status, message);

            return Err(Error::ServerError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::TransportError(e.to_string()))?;

        let raw: RawScore =
            serde_json::from_slice(&body).map_err(|e| Error::MalformedResponse(e.to_string()))?;

        let score = raw.validate().map_err(Error::MalformedResponse)?;

        info!(
            "Received score: articulation={}, prosody={}, overall={}",
            score.articulation, score.prosody, score.overall
        );

        Ok(score)
    }
}

/// Pull a `message` field out of a JSON error body, if there is one.
fn extract_message(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

/// Clears the in-flight flag on every exit path out of `submit`.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
