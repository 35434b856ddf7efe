mod client;
mod score;

pub use client::{AnalysisClient, AnalysisPrompt};
pub use score::PronunciationScore;
