use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub analysis: AnalysisConfig,
    pub recording: RecordingConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    /// Base URL of the external scoring service.
    pub base_url: String,
    /// Practice language passed along with submissions.
    pub language: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordingConfig {
    /// Ordered encoding preference list for format negotiation.
    pub preferred_formats: Vec<String>,
    /// Scratch directory artifact handles are materialized into.
    pub scratch_path: String,
    /// Directory exported recordings are saved to.
    pub export_path: String,
    /// Fixed prefix for exported file names.
    pub export_prefix: String,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
