use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use speakcheck::{
    AnalysisClient, ArtifactStore, Config, MicrophoneDevice, RecordingSession, SessionConfig,
};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "speakcheck",
    about = "Record a short utterance and score its pronunciation"
)]
struct Args {
    /// Config file (without extension)
    #[arg(long, default_value = "config/speakcheck")]
    config: String,

    /// Seconds to record
    #[arg(long, default_value_t = 5)]
    seconds: u64,

    /// The sentence being practiced
    #[arg(long)]
    text: Option<String>,

    /// Submit the recording to the scoring service
    #[arg(long)]
    analyze: bool,

    /// Save the recording to the export directory
    #[arg(long)]
    export: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} v0.1.0", cfg.service.name);

    let session_config = SessionConfig {
        preferred_formats: cfg.recording.preferred_formats.clone(),
        language: Some(cfg.analysis.language.clone()),
        target_text: args.text.clone(),
        export_prefix: cfg.recording.export_prefix.clone(),
        ..SessionConfig::default()
    };

    let session = RecordingSession::new(
        session_config,
        Box::new(MicrophoneDevice::new()),
        ArtifactStore::new(&cfg.recording.scratch_path)?,
        AnalysisClient::new(&cfg.analysis.base_url),
    );

    info!("Recording for {} seconds...", args.seconds);
    session.start().await?;
    tokio::time::sleep(Duration::from_secs(args.seconds)).await;
    session.stop().await?;

    let snapshot = session.snapshot().await;
    info!(
        "Captured a take ({})",
        snapshot.negotiated_mime.as_deref().unwrap_or("unknown format")
    );

    if args.export {
        let path = session.export(&cfg.recording.export_path).await?;
        info!("Saved recording to {}", path.display());
    }

    if args.analyze {
        match session.submit_for_analysis().await? {
            Some(score) => info!(
                "Score: articulation={}, prosody={}, overall={}",
                score.articulation, score.prosody, score.overall
            ),
            None => info!("Analysis response discarded"),
        }
    }

    session.reset().await;

    Ok(())
}
