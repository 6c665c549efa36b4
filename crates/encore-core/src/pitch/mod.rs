//! Microphone pitch detection and scoring
//!
//! - [`detector`]: autocorrelation frequency estimation
//! - [`scoring`]: cents, accuracy and feedback tiers
//! - [`microphone`]: capture devices and the releasing lease
//! - [`analysis`]: the engine tying samples to the lyric timeline

mod analysis;
mod detector;
mod error;
mod microphone;
mod scoring;

pub use analysis::{PitchAnalysisEngine, PitchAnalysisResult};
pub use detector::{PitchDetector, PitchEstimate};
pub use error::AnalysisError;
pub use microphone::{CpalMicrophone, Microphone, MicrophoneLease, PitchSample};
pub use scoring::{
    score, FeedbackTier, PitchDirection, Score, ScoringRules, OFF_CENTS, PERFECT_CENTS,
    SLIGHTLY_OFF_CENTS,
};

#[cfg(test)]
pub(crate) use microphone::fake;
