//! Artifact ownership and the lifetime of its ephemeral handle.
//!
//! An [`Artifact`] is the finalized encoded audio of one completed
//! recording. Materializing it produces exactly one [`ArtifactHandle`] -- a
//! short-lived scratch file enabling playback and export without
//! duplicating the bytes in session state. Every materialize is paired with
//! exactly one release; release is idempotent and `Drop` acts as a
//! backstop so no handle survives its artifact.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{info, warn};

use crate::audio::format::MediaFormat;
use crate::error::{Error, Result};

/// The finalized encoded audio produced by one completed recording.
#[derive(Debug, Clone)]
pub struct Artifact {
    bytes: Vec<u8>,
    format: MediaFormat,
}

impl Artifact {
    pub fn new(bytes: Vec<u8>, format: MediaFormat) -> Self {
        Self { bytes, format }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn format(&self) -> &MediaFormat {
        &self.format
    }
}

/// Owns the scratch directory artifact handles are materialized into.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    scratch_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Result<Self> {
        let scratch_dir = scratch_dir.into();
        fs::create_dir_all(&scratch_dir)?;

        Ok(Self { scratch_dir })
    }

    /// Produce the one live handle for this artifact.
    ///
    /// The caller (the session) guarantees no second handle references the
    /// same artifact simultaneously.
    pub fn materialize(&self, artifact: &Artifact) -> Result<ArtifactHandle> {
        let path = self.scratch_dir.join(format!(
            "take-{}.{}",
            uuid::Uuid::new_v4(),
            artifact.format().extension()
        ));

        fs::write(&path, artifact.bytes())?;

        info!(
            "Materialized artifact handle: {} ({} bytes)",
            path.display(),
            artifact.len()
        );

        Ok(ArtifactHandle {
            path,
            released: false,
        })
    }
}

/// Ephemeral playable/exportable reference to a materialized artifact.
#[derive(Debug)]
pub struct ArtifactHandle {
    path: PathBuf,
    released: bool,
}

impl ArtifactHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Invalidate the handle and delete the backing scratch file.
    ///
    /// Safe to call repeatedly; everything after the first call is a no-op.
    pub fn release(&mut self) {
        if self.released {
            return;
        }

        self.released = true;

        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove artifact scratch file: {}", e);
            }
        } else {
            info!("Released artifact handle: {}", self.path.display());
        }
    }

    /// Check that the backing file decodes as the negotiated container.
    pub fn verify_playable(&self, format: &MediaFormat) -> Result<()> {
        if self.released {
            return Err(Error::PlaybackFailed("handle already released".to_string()));
        }

        let file = fs::File::open(&self.path)
            .map_err(|e| Error::PlaybackFailed(e.to_string()))?;

        let stream = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        hint.with_extension(&format.extension());

        symphonia::default::get_probe()
            .format(
                &hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::PlaybackFailed(e.to_string()))?;

        Ok(())
    }

    /// Save a copy of the recording under `dir` with the export name.
    pub fn export_to(
        &self,
        dir: impl AsRef<Path>,
        prefix: &str,
        format: &MediaFormat,
    ) -> Result<PathBuf> {
        if self.released {
            return Err(Error::NoArtifact);
        }

        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let target = dir.join(export_file_name(prefix, &Utc::now(), format));
        fs::copy(&self.path, &target)?;

        info!("Exported recording to {}", target.display());

        Ok(target)
    }
}

impl Drop for ArtifactHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Export file name: fixed prefix, timestamp with every non-alphanumeric
/// run collapsed to a single `-`, and the negotiated extension.
pub fn export_file_name(prefix: &str, timestamp: &DateTime<Utc>, format: &MediaFormat) -> String {
    let stamp = timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut normalized = String::with_capacity(stamp.len());
    for c in stamp.chars() {
        if c.is_ascii_alphanumeric() {
            normalized.push(c);
        } else if !normalized.ends_with('-') {
            normalized.push('-');
        }
    }
    let normalized = normalized.trim_matches('-');

    format!("{}-{}.{}", prefix, normalized, format.extension())
}
