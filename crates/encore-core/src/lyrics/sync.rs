//! Lyric highlight resolution
//!
//! Pure mapping from (playback time, syllable groups) to highlight state.
//! Nothing here holds state between calls: the same inputs always produce
//! the same [`LyricHighlight`].

use super::{Syllable, SyllableGroup};

/// 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Per-channel linear interpolation (`t` clamped to 0..1)
    pub fn lerp(self, other: Rgb, t: f64) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Rgb {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
        }
    }

    /// Parse "#RRGGBB"
    pub fn from_hex(s: &str) -> Option<Rgb> {
        let s = s.strip_prefix('#')?;
        if s.len() != 6 {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(s.get(i..i + 2)?, 16).ok();
        Some(Rgb::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

/// Colors for unsung and sung characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightPalette {
    pub base: Rgb,
    pub highlight: Rgb,
}

impl Default for HighlightPalette {
    fn default() -> Self {
        Self {
            base: Rgb::new(0xFF, 0xFF, 0xFF),
            highlight: Rgb::new(0x4F, 0xC3, 0xF7),
        }
    }
}

/// Highlight state of a single character
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CharHighlight {
    /// Already sung
    Full,
    /// Currently being sung; fraction of the highlight applied (0..1)
    Partial(f64),
    /// Not yet reached
    None,
}

impl CharHighlight {
    /// Resolve to a display color
    pub fn color(&self, palette: &HighlightPalette) -> Rgb {
        match self {
            CharHighlight::Full => palette.highlight,
            CharHighlight::Partial(t) => palette.base.lerp(palette.highlight, *t),
            CharHighlight::None => palette.base,
        }
    }
}

/// Highlight state for the group active at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct LyricHighlight {
    /// Index of the active group in the timeline
    pub group_index: usize,
    /// Index of the syllable whose span contains the time, if any
    pub syllable_index: Option<usize>,
    /// Progress through the group window, 0..1
    pub progress: f64,
    /// Characters in the group's full text
    pub total_chars: usize,
    /// Character currently being sung, `None` when the text is empty
    pub active_char_index: Option<usize>,
    /// Fractional highlight of the active character, 0..1
    pub active_char_fraction: f64,
}

impl LyricHighlight {
    /// Highlight state of character `index`
    pub fn char_highlight(&self, index: usize) -> CharHighlight {
        match self.active_char_index {
            Some(active) if index < active => CharHighlight::Full,
            Some(active) if index == active => CharHighlight::Partial(self.active_char_fraction),
            _ => CharHighlight::None,
        }
    }

    /// Colors for every character of the group, in order
    pub fn colors(&self, palette: &HighlightPalette) -> Vec<Rgb> {
        (0..self.total_chars)
            .map(|i| self.char_highlight(i).color(palette))
            .collect()
    }
}

/// Index of the group with `start_time <= t <= end_time`
///
/// Groups are sorted and non-overlapping, so a binary search over start
/// times finds the only candidate. When two groups touch (`end == next start`)
/// the later one wins.
pub fn active_group(t: f64, groups: &[SyllableGroup]) -> Option<usize> {
    if !t.is_finite() {
        return None;
    }
    let candidates = groups.partition_point(|g| g.start_time <= t);
    let index = candidates.checked_sub(1)?;
    groups[index].contains(t).then_some(index)
}

/// Index of the syllable in `group` whose span contains `t`
pub fn active_syllable(t: f64, group: &SyllableGroup) -> Option<usize> {
    let syllables: &[Syllable] = &group.syllables;
    let candidates = syllables.partition_point(|s| s.start_time <= t);
    let index = candidates.checked_sub(1)?;
    syllables[index].contains(t).then_some(index)
}

/// Resolve the full highlight state at time `t`
pub fn resolve(t: f64, groups: &[SyllableGroup]) -> Option<LyricHighlight> {
    let group_index = active_group(t, groups)?;
    let group = &groups[group_index];

    let span = group.end_time - group.start_time;
    let progress = if span > 0.0 {
        ((t - group.start_time) / span).clamp(0.0, 1.0)
    } else {
        1.0
    };

    let total_chars = group.total_chars();
    let (active_char_index, active_char_fraction) = if total_chars == 0 {
        (None, 0.0)
    } else {
        let scaled = total_chars as f64 * progress;
        let index = (scaled.floor() as usize).min(total_chars - 1);
        (Some(index), (scaled - index as f64).clamp(0.0, 1.0))
    };

    Some(LyricHighlight {
        group_index,
        syllable_index: active_syllable(t, group),
        progress,
        total_chars,
        active_char_index,
        active_char_fraction,
    })
}
