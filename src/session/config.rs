use serde::{Deserialize, Serialize};

/// Configuration for a recording session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g. "practice-<uuid>")
    pub session_id: String,

    /// Ordered encoding preference list; negotiation picks the first entry
    /// the capture device reports as encodable.
    pub preferred_formats: Vec<String>,

    /// Practice language sent alongside the audio, if set.
    pub language: Option<String>,

    /// The sentence being practiced, sent alongside the audio if set.
    pub target_text: Option<String>,

    /// Fixed prefix for exported recording file names.
    pub export_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("practice-{}", uuid::Uuid::new_v4()),
            preferred_formats: vec![
                "audio/wav".to_string(),
                "audio/x-wav".to_string(),
                "audio/webm;codecs=opus".to_string(),
            ],
            language: Some("en".to_string()),
            target_text: None,
            export_prefix: "recording".to_string(),
        }
    }
}
