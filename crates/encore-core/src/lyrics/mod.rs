//! Lyric timing data and highlight resolution
//!
//! Lyrics arrive as time-sorted syllable groups. Each group owns a highlight
//! window and an ordered list of syllables, some of which carry the target
//! pitch the singer is scored against.

mod sync;

pub use sync::{
    active_group, active_syllable, resolve, CharHighlight, HighlightPalette, LyricHighlight, Rgb,
};

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::music::NotePitch;

/// Errors from loading or validating lyric timing data
#[derive(Error, Debug)]
pub enum LyricsError {
    /// File could not be read
    #[error("Failed to read lyrics file {path:?}: {source}")]
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// JSON did not match the lyrics schema
    #[error("Invalid lyrics JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Group ends before it starts
    #[error("Group {index} has end {end:.3}s before start {start:.3}s")]
    InvertedGroup { index: usize, start: f64, end: f64 },

    /// Group starts before the previous one ended
    #[error("Group {index} starts at {start:.3}s before previous group ends at {previous_end:.3}s")]
    OverlappingGroups {
        index: usize,
        start: f64,
        previous_end: f64,
    },

    /// Negative, NaN or infinite timestamp
    #[error("Group {group} has an invalid time {time}")]
    InvalidTime { group: usize, time: f64 },

    /// Syllable span escapes its group
    #[error("Syllable {syllable} of group {group} lies outside the group span")]
    SyllableOutsideGroup { group: usize, syllable: usize },

    /// Syllable ends before it starts
    #[error("Syllable {syllable} of group {group} ends before it starts")]
    InvertedSyllable { group: usize, syllable: usize },

    /// Syllable starts before the previous one in its group ended
    #[error("Syllable {syllable} of group {group} overlaps the previous syllable")]
    OverlappingSyllables { group: usize, syllable: usize },
}

/// One timed syllable within a group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Syllable {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    /// Target pitch for scoring, absent for spoken or unpitched syllables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<NotePitch>,
}

impl Syllable {
    /// Whether `t` falls inside this syllable's span (inclusive)
    pub fn contains(&self, t: f64) -> bool {
        self.start_time <= t && t <= self.end_time
    }
}

/// A lyric line (or phrase) sharing one highlight animation window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyllableGroup {
    pub start_time: f64,
    pub end_time: f64,
    pub full_text: String,
    #[serde(default)]
    pub syllables: Vec<Syllable>,
}

impl SyllableGroup {
    /// Whether `t` falls inside this group's span (inclusive)
    pub fn contains(&self, t: f64) -> bool {
        self.start_time <= t && t <= self.end_time
    }

    /// Number of highlightable characters (Unicode scalar values)
    pub fn total_chars(&self) -> usize {
        self.full_text.chars().count()
    }
}

/// Full lyric document for one song
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricsData {
    #[serde(default)]
    pub title: String,
    /// Plain lyric lines (display only)
    #[serde(default)]
    pub lyrics: Vec<String>,
    #[serde(default)]
    pub syllable_groups: Vec<SyllableGroup>,
}

impl LyricsData {
    /// Parse a lyrics document from JSON and validate its timeline
    pub fn from_json(json: &str) -> Result<Self, LyricsError> {
        let data: LyricsData = serde_json::from_str(json)?;
        validate_timeline(&data.syllable_groups)?;
        Ok(data)
    }

    /// Load and validate a lyrics document from a JSON file
    pub fn load(path: &Path) -> Result<Self, LyricsError> {
        let contents = std::fs::read_to_string(path).map_err(|source| LyricsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let data = Self::from_json(&contents)?;
        log::info!(
            "Loaded lyrics '{}' ({} groups) from {:?}",
            data.title,
            data.syllable_groups.len(),
            path
        );
        Ok(data)
    }
}

/// Check the timeline invariants the highlight resolver relies on
///
/// All times must be finite and non-negative. Groups must be time-sorted and
/// non-overlapping (touching boundaries are allowed). Within a group,
/// syllables must be sorted, non-overlapping and inside the group's span.
pub fn validate_timeline(groups: &[SyllableGroup]) -> Result<(), LyricsError> {
    let mut previous_end = f64::NEG_INFINITY;

    for (index, group) in groups.iter().enumerate() {
        let times = [group.start_time, group.end_time]
            .into_iter()
            .chain(group.syllables.iter().flat_map(|s| [s.start_time, s.end_time]));
        for time in times {
            if !time.is_finite() || time < 0.0 {
                return Err(LyricsError::InvalidTime { group: index, time });
            }
        }

        if group.end_time < group.start_time {
            return Err(LyricsError::InvertedGroup {
                index,
                start: group.start_time,
                end: group.end_time,
            });
        }
        if group.start_time < previous_end {
            return Err(LyricsError::OverlappingGroups {
                index,
                start: group.start_time,
                previous_end,
            });
        }

        let mut syllable_end = group.start_time;
        for (syllable, s) in group.syllables.iter().enumerate() {
            if s.end_time < s.start_time {
                return Err(LyricsError::InvertedSyllable { group: index, syllable });
            }
            if s.start_time < group.start_time || s.end_time > group.end_time {
                return Err(LyricsError::SyllableOutsideGroup { group: index, syllable });
            }
            if s.start_time < syllable_end {
                return Err(LyricsError::OverlappingSyllables { group: index, syllable });
            }
            syllable_end = s.end_time;
        }
        previous_end = group.end_time;
    }

    Ok(())
}
