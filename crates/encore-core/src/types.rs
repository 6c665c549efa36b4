//! Shared sample types and time conversions
//!
//! Renderers work on [`StereoBuffer`]s of [`StereoSample`] frames. Engines
//! talk in seconds, transports in frames, status listeners in milliseconds.

use std::ops::{Index, IndexMut};

/// Fallback rate when a device reports none
pub const SAMPLE_RATE: u32 = 48000;

pub type Sample = f32;

/// One stereo frame
///
/// `#[repr(C)]` fixes the layout to `[left, right]`, so a frame slice can be
/// viewed as interleaved `f32` without copying (see
/// [`StereoBuffer::as_interleaved`]).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Same value on both channels
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self::new(value, value)
    }

    /// Point `t` (0..1) of the way from `self` to `other`
    #[inline]
    pub fn lerp(&self, other: &Self, t: Sample) -> Self {
        Self::new(
            self.left + (other.left - self.left) * t,
            self.right + (other.right - self.right) * t,
        )
    }
}

/// Growable frame buffer reused across audio callbacks
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    frames: Vec<StereoSample>,
}

impl StereoBuffer {
    /// `len` frames of silence
    pub fn silence(len: usize) -> Self {
        Self {
            frames: vec![StereoSample::silence(); len],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Resize within the allocated capacity; new frames are silent
    ///
    /// Must not grow past the capacity from construction, so it never
    /// allocates on the audio thread.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        debug_assert!(
            new_len <= self.frames.capacity(),
            "buffer resized past its preallocated capacity"
        );
        self.frames.resize(new_len, StereoSample::silence());
    }

    pub fn fill_silence(&mut self) {
        self.frames.fill(StereoSample::silence());
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.frames
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.frames
    }

    /// Interleaved `[L, R, L, R, ...]` view
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.frames)
    }

    #[inline]
    pub fn as_interleaved_mut(&mut self) -> &mut [Sample] {
        bytemuck::cast_slice_mut(&mut self.frames)
    }

    /// Largest absolute sample on either channel
    pub fn peak(&self) -> Sample {
        self.as_interleaved()
            .iter()
            .fold(0.0, |peak: Sample, s| peak.max(s.abs()))
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &StereoSample {
        &self.frames[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut StereoSample {
        &mut self.frames[index]
    }
}

/// Seconds to a frame index; negative and non-finite input map to 0
#[inline]
pub fn secs_to_frames(secs: f64, sample_rate: u32) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        (secs * sample_rate as f64).round() as u64
    } else {
        0
    }
}

#[inline]
pub fn frames_to_secs(frames: u64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        0.0
    } else {
        frames as f64 / sample_rate as f64
    }
}

/// Seconds to whole milliseconds for status payloads
#[inline]
pub fn secs_to_millis(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        (secs * 1000.0).round() as u64
    } else {
        0
    }
}
