use tracing::info;

use crate::audio::capture::CaptureDevice;
use crate::error::{Error, Result};

/// A negotiated encoding, identified by its MIME type (codec parameters
/// included, e.g. `audio/webm;codecs=opus`).
///
/// Chosen once per recording and pinned for the session's lifetime: it
/// stamps the artifact's MIME type and the file extension of any export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFormat {
    mime: String,
}

impl MediaFormat {
    pub fn new(mime: impl Into<String>) -> Self {
        Self { mime: mime.into() }
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// File extension derived from the MIME subtype.
    ///
    /// Codec parameters are dropped, a leading `x-` is stripped
    /// (`audio/x-wav` -> `wav`), and `mpeg` maps to the conventional `mp3`.
    pub fn extension(&self) -> String {
        let subtype = self
            .mime
            .split('/')
            .nth(1)
            .unwrap_or("bin")
            .split(';')
            .next()
            .unwrap_or("bin")
            .trim();

        let subtype = subtype.strip_prefix("x-").unwrap_or(subtype);

        match subtype {
            "mpeg" => "mp3".to_string(),
            "" => "bin".to_string(),
            other => other.to_ascii_lowercase(),
        }
    }

    /// `{stem}.{extension}`, e.g. the filename attached to an upload.
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.extension())
    }
}

/// Pick the first entry of the ordered preference list the device reports
/// as encodable.
///
/// Fails with `NoSupportedFormat` when nothing matches.
pub fn negotiate(preferences: &[String], device: &dyn CaptureDevice) -> Result<MediaFormat> {
    for mime in preferences {
        let candidate = MediaFormat::new(mime.clone());
        if device.supports(&candidate) {
            info!("Negotiated recording format: {}", candidate.mime());
            return Ok(candidate);
        }
    }

    Err(Error::NoSupportedFormat)
}
