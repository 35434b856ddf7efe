use serde::{Deserialize, Serialize};

/// Pronunciation quality assessment returned by the external scorer.
///
/// The session never fabricates one of these; the only producer is a
/// successful analysis response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PronunciationScore {
    /// Articulation accuracy, 0-100.
    pub articulation: u8,
    /// Prosody and intonation, 0-100.
    pub prosody: u8,
    /// Overall score, 0-100.
    pub overall: u8,
}

/// Response body as received off the wire, before range validation.
#[derive(Debug, Deserialize)]
pub(crate) struct RawScore {
    articulation: i64,
    prosody: i64,
    overall: i64,
}

impl RawScore {
    /// Check every field is an integer in [0, 100].
    pub(crate) fn validate(self) -> Result<PronunciationScore, String> {
        let field = |name: &str, value: i64| -> Result<u8, String> {
            if (0..=100).contains(&value) {
                Ok(value as u8)
            } else {
                Err(format!("{} out of range: {}", name, value))
            }
        };

        Ok(PronunciationScore {
            articulation: field("articulation", self.articulation)?,
            prosody: field("prosody", self.prosody)?,
            overall: field("overall", self.overall)?,
        })
    }
}
