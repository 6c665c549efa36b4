//! Engine configuration sections

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ab_loop::DEFAULT_LOOP_COOLDOWN;
use crate::audio::AudioConfig;
use crate::metronome::{clamp_bpm, TimeSignature, DEFAULT_BPM};
use crate::pitch::ScoringRules;

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub playback: PlaybackConfig,
    pub analysis: AnalysisConfig,
    pub metronome: MetronomeConfig,
    pub storage: StorageConfig,
    pub audio: AudioConfig,
}

/// Playback and A-B loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Position poll period driving the loop and lyric sync
    /// Default: 100 ms
    pub poll_interval_ms: u64,

    /// Time after a loop seek during which the loop cannot re-trigger
    /// Default: 500 ms
    pub loop_cooldown_ms: u64,

    /// Set point B to the track end once the duration is known
    /// Default: true
    pub auto_loop_full_track: bool,

    /// Try the pitch-shifting backend before the streaming one
    /// Default: true
    pub prefer_native: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            loop_cooldown_ms: DEFAULT_LOOP_COOLDOWN.as_millis() as u64,
            auto_loop_full_track: true,
            prefer_native: true,
        }
    }
}

impl PlaybackConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn loop_cooldown(&self) -> Duration {
        Duration::from_millis(self.loop_cooldown_ms)
    }
}

/// Microphone analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Pitch sample period
    /// Default: 100 ms
    pub sample_interval_ms: u64,

    /// Samples below this confidence are discarded
    /// Default: 0.4
    pub min_confidence: f64,

    /// Largest deviation still counted as on pitch
    /// Default: 50 cents
    pub tolerance_cents: f64,

    /// Deviation at which accuracy reaches zero
    /// Default: 200 cents
    pub zero_accuracy_cents: f64,

    /// Tuning reference
    /// Default: 440 Hz
    pub reference_a4: f64,

    /// Detector range
    /// Default: 80..1000 Hz
    pub min_frequency: f64,
    pub max_frequency: f64,

    /// Detector window in samples
    /// Default: 2048
    pub window_size: usize,

    /// Allow opening the input device at all
    /// Default: true
    pub microphone_enabled: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let rules = ScoringRules::default();
        Self {
            sample_interval_ms: 100,
            min_confidence: 0.4,
            tolerance_cents: rules.tolerance_cents,
            zero_accuracy_cents: rules.zero_accuracy_cents,
            reference_a4: crate::music::A4_FREQUENCY,
            min_frequency: 80.0,
            max_frequency: 1000.0,
            window_size: 2048,
            microphone_enabled: true,
        }
    }
}

impl AnalysisConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }

    pub fn scoring_rules(&self) -> ScoringRules {
        ScoringRules {
            tolerance_cents: self.tolerance_cents,
            zero_accuracy_cents: self.zero_accuracy_cents,
        }
    }
}

/// Metronome defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    /// BPM used when the song has no estimate
    /// Default: 120
    pub default_bpm: f64,
    pub time_signature: TimeSignature,
    /// Start ticking when playback starts
    /// Default: false
    pub enabled: bool,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            default_bpm: DEFAULT_BPM,
            time_signature: TimeSignature::default(),
            enabled: false,
        }
    }
}

impl MetronomeConfig {
    /// Song estimate if present, else the configured default (clamped)
    pub fn initial_bpm(&self, estimated: Option<f64>) -> f64 {
        clamp_bpm(estimated.unwrap_or(self.default_bpm))
    }
}

/// Saved-section storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Key the section list is stored under
    /// Default: "saved_sections"
    pub sections_key: String,
    /// Store file name inside the data directory
    /// Default: "sections.json"
    pub store_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sections_key: crate::sections::SAVED_SECTIONS_KEY.to_string(),
            store_file: "sections.json".to_string(),
        }
    }
}
