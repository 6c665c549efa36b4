//! Audio-thread track renderer and lock-free transport state
//!
//! [`TrackRenderer`] is owned by a backend's stream callback. It applies
//! [`TransportCommand`]s, reads the decoded track at the device rate and
//! publishes its state through [`TransportAtomics`], which the control
//! thread reads without locking.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::command::TransportCommand;
use crate::audio_file::DecodedTrack;
use crate::types::{StereoBuffer, StereoSample};

/// Lock-free transport state shared between audio and control threads
///
/// Uses Relaxed ordering: each value is independent and a one-callback lag
/// is acceptable for display and position polling.
#[derive(Debug, Default)]
pub struct TransportAtomics {
    /// Playhead in track frames
    pub position: AtomicU64,
    /// Renderer is advancing
    pub playing: AtomicBool,
    /// Playhead reached the end of the track
    pub ended: AtomicBool,
    /// Number of internal A-B wraps since the track was loaded
    pub loop_wraps: AtomicU64,
}

impl TransportAtomics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn loop_wraps(&self) -> u64 {
        self.loop_wraps.load(Ordering::Relaxed)
    }

    /// Control-side reset when a new track is queued
    pub fn reset(&self) {
        self.position.store(0, Ordering::Relaxed);
        self.playing.store(false, Ordering::Relaxed);
        self.ended.store(false, Ordering::Relaxed);
        self.loop_wraps.store(0, Ordering::Relaxed);
    }
}

/// Reads a decoded track at the device sample rate
///
/// The read position is fractional; when the track rate differs from the
/// device rate each output frame advances it by `track_rate / device_rate`
/// and samples are linearly interpolated.
pub struct TrackRenderer {
    track: Option<Arc<DecodedTrack>>,
    device_rate: u32,
    /// Read position in track frames
    position: f64,
    /// Track frames consumed per output frame
    step: f64,
    playing: bool,
    loop_bounds: Option<(u64, u64)>,
    loop_wraps: u64,
    /// Set on seek, load or wrap; cleared by `take_discontinuity`
    discontinuity: bool,
    atomics: Arc<TransportAtomics>,
}

impl TrackRenderer {
    pub fn new(device_rate: u32, atomics: Arc<TransportAtomics>) -> Self {
        Self {
            track: None,
            device_rate: device_rate.max(1),
            position: 0.0,
            step: 1.0,
            playing: false,
            loop_bounds: None,
            loop_wraps: 0,
            discontinuity: false,
            atomics,
        }
    }

    /// Apply one transport command
    ///
    /// `SetPitch` is not a renderer concern and is ignored here.
    pub fn apply(&mut self, command: TransportCommand) {
        match command {
            TransportCommand::Load(track) => {
                self.step = track.sample_rate as f64 / self.device_rate as f64;
                self.track = Some(track);
                self.position = 0.0;
                self.playing = false;
                self.loop_bounds = None;
                self.loop_wraps = 0;
                self.discontinuity = true;
                self.atomics.ended.store(false, Ordering::Relaxed);
            }
            TransportCommand::Unload => {
                self.track = None;
                self.position = 0.0;
                self.playing = false;
                self.loop_bounds = None;
            }
            TransportCommand::Play => {
                if self.track.is_some() {
                    if self.at_end() {
                        self.position = 0.0;
                        self.discontinuity = true;
                    }
                    self.playing = true;
                    self.atomics.ended.store(false, Ordering::Relaxed);
                }
            }
            TransportCommand::Pause => self.playing = false,
            TransportCommand::Seek(frame) => {
                self.position = frame.min(self.total_frames()) as f64;
                self.discontinuity = true;
                self.atomics.ended.store(false, Ordering::Relaxed);
            }
            TransportCommand::SetLoop(bounds) => {
                // B at the track end leaves nothing to loop: the track ends
                let total = self.total_frames();
                self.loop_bounds = bounds.filter(|(a, b)| a < b && *b < total);
            }
            TransportCommand::SetPitch(_) => {}
        }
        self.publish();
    }

    /// Drain and apply every pending command
    pub fn process_commands(&mut self, commands: &mut rtrb::Consumer<TransportCommand>) {
        while let Ok(command) = commands.pop() {
            self.apply(command);
        }
    }

    /// Render into `output`, which is pre-filled with silence
    pub fn render(&mut self, output: &mut StereoBuffer) {
        let Some(track) = self.track.as_ref() else {
            return;
        };
        if !self.playing {
            return;
        }

        let samples = &track.samples;
        let total = samples.len() as f64;

        for out in output.as_mut_slice() {
            if self.position >= total {
                self.playing = false;
                self.position = total;
                self.atomics.ended.store(true, Ordering::Relaxed);
                break;
            }

            *out = interpolate(samples, self.position);
            let previous = self.position;
            self.position += self.step;

            if let Some((a, b)) = self.loop_bounds {
                let (a, b) = (a as f64, b as f64);
                if self.position >= b {
                    // Crossing B keeps the sub-frame remainder; a playhead that
                    // was already past B lands exactly on A
                    let carry = self.position - b;
                    self.position = if previous < b && carry < b - a { a + carry } else { a };
                    self.loop_wraps += 1;
                    self.discontinuity = true;
                }
            }
        }

        self.publish();
    }

    /// Whether a seek, load or wrap happened since the last call
    pub fn take_discontinuity(&mut self) -> bool {
        std::mem::take(&mut self.discontinuity)
    }

    pub fn position_frames(&self) -> u64 {
        self.position as u64
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    fn total_frames(&self) -> u64 {
        self.track.as_ref().map(|t| t.frames()).unwrap_or(0)
    }

    fn at_end(&self) -> bool {
        self.position >= self.total_frames() as f64
    }

    fn publish(&self) {
        self.atomics.position.store(self.position as u64, Ordering::Relaxed);
        self.atomics.playing.store(self.playing, Ordering::Relaxed);
        self.atomics.loop_wraps.store(self.loop_wraps, Ordering::Relaxed);
    }
}

#[inline]
fn interpolate(samples: &[StereoSample], position: f64) -> StereoSample {
    let index = position as usize;
    let frac = (position - index as f64) as f32;
    match (samples.get(index), samples.get(index + 1)) {
        (Some(a), Some(b)) if frac > 0.0 => a.lerp(b, frac),
        (Some(a), _) => *a,
        _ => StereoSample::silence(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::command::command_channel;

    /// Track whose left channel holds the frame index
    fn ramp(frames: usize, sample_rate: u32) -> Arc<DecodedTrack> {
        Arc::new(DecodedTrack {
            samples: (0..frames).map(|i| StereoSample::new(i as f32, 0.0)).collect(),
            sample_rate,
        })
    }

    fn renderer(device_rate: u32) -> (TrackRenderer, Arc<TransportAtomics>) {
        let atomics = Arc::new(TransportAtomics::new());
        (TrackRenderer::new(device_rate, atomics.clone()), atomics)
    }

    #[test]
    fn test_silent_until_play() {
        let (mut r, atomics) = renderer(100);
        r.apply(TransportCommand::Load(ramp(50, 100)));

        let mut out = StereoBuffer::silence(10);
        r.render(&mut out);
        assert_eq!(out.peak(), 0.0);
        assert_eq!(atomics.position(), 0);

        r.apply(TransportCommand::Play);
        r.render(&mut out);
        assert_eq!(out[3].left, 3.0);
        assert_eq!(atomics.position(), 10);
        assert!(atomics.is_playing());
    }

    #[test]
    fn test_resampling_interpolates() {
        // Track at half the device rate: each output frame advances 0.5
        let (mut r, _) = renderer(200);
        r.apply(TransportCommand::Load(ramp(50, 100)));
        r.apply(TransportCommand::Play);

        let mut out = StereoBuffer::silence(4);
        r.render(&mut out);
        let lefts: Vec<f32> = out.as_slice().iter().map(|s| s.left).collect();
        assert_eq!(lefts, vec![0.0, 0.5, 1.0, 1.5]);
        assert_eq!(r.position_frames(), 2);
    }

    #[test]
    fn test_end_of_track_stops() {
        let (mut r, atomics) = renderer(100);
        r.apply(TransportCommand::Load(ramp(5, 100)));
        r.apply(TransportCommand::Play);

        let mut out = StereoBuffer::silence(8);
        r.render(&mut out);
        assert_eq!(out[4].left, 4.0);
        assert_eq!(out[6].left, 0.0);
        assert!(!r.is_playing());
        assert!(atomics.has_ended());

        // Play after the end restarts from the top
        r.apply(TransportCommand::Play);
        assert!(r.take_discontinuity());
        assert_eq!(r.position_frames(), 0);
        assert!(!atomics.has_ended());
    }

    #[test]
    fn test_seek_clamps_and_flags_discontinuity() {
        let (mut r, atomics) = renderer(100);
        r.apply(TransportCommand::Load(ramp(20, 100)));
        r.take_discontinuity();

        r.apply(TransportCommand::Seek(500));
        assert_eq!(atomics.position(), 20);
        assert!(r.take_discontinuity());
        assert!(!r.take_discontinuity());
    }

    #[test]
    fn test_internal_loop_wraps() {
        let (mut r, atomics) = renderer(100);
        r.apply(TransportCommand::Load(ramp(100, 100)));
        r.apply(TransportCommand::SetLoop(Some((10, 20))));
        r.apply(TransportCommand::Seek(15));
        r.apply(TransportCommand::Play);
        r.take_discontinuity();

        let mut out = StereoBuffer::silence(10);
        r.render(&mut out);
        let lefts: Vec<f32> = out.as_slice().iter().map(|s| s.left).collect();
        assert_eq!(lefts, vec![15.0, 16.0, 17.0, 18.0, 19.0, 10.0, 11.0, 12.0, 13.0, 14.0]);
        assert_eq!(atomics.loop_wraps(), 1);
        assert!(r.take_discontinuity());
    }

    #[test]
    fn test_loop_from_past_b_lands_on_a() {
        let (mut r, atomics) = renderer(100);
        r.apply(TransportCommand::Load(ramp(100, 100)));
        r.apply(TransportCommand::Seek(45));
        r.apply(TransportCommand::SetLoop(Some((10, 20))));
        r.apply(TransportCommand::Play);

        let mut out = StereoBuffer::silence(4);
        r.render(&mut out);
        let lefts: Vec<f32> = out.as_slice().iter().map(|s| s.left).collect();
        assert_eq!(lefts, vec![45.0, 10.0, 11.0, 12.0]);
        assert_eq!(atomics.loop_wraps(), 1);
    }

    #[test]
    fn test_loop_wrap_with_resampling_keeps_remainder() {
        // Track at twice the device rate: each output frame advances 2.0
        let (mut r, atomics) = renderer(50);
        r.apply(TransportCommand::Load(ramp(100, 100)));
        r.apply(TransportCommand::SetLoop(Some((10, 20))));
        r.apply(TransportCommand::Seek(17));
        r.apply(TransportCommand::Play);

        let mut out = StereoBuffer::silence(4);
        r.render(&mut out);
        let lefts: Vec<f32> = out.as_slice().iter().map(|s| s.left).collect();
        assert_eq!(lefts, vec![17.0, 19.0, 11.0, 13.0]);
        assert_eq!(atomics.loop_wraps(), 1);
    }

    #[test]
    fn test_loop_ending_at_track_end_lets_track_finish() {
        let (mut r, atomics) = renderer(100);
        r.apply(TransportCommand::Load(ramp(30, 100)));
        r.apply(TransportCommand::SetLoop(Some((10, 30))));
        r.apply(TransportCommand::Seek(27));
        r.apply(TransportCommand::Play);

        let mut out = StereoBuffer::silence(6);
        r.render(&mut out);
        assert_eq!(out[2].left, 29.0);
        assert_eq!(out[3].left, 0.0);
        assert!(atomics.has_ended());
        assert_eq!(atomics.loop_wraps(), 0);
    }

    #[test]
    fn test_invalid_loop_bounds_ignored() {
        let (mut r, _) = renderer(100);
        r.apply(TransportCommand::Load(ramp(30, 100)));
        r.apply(TransportCommand::SetLoop(Some((20, 10))));
        r.apply(TransportCommand::SetLoop(Some((10, 40))));
        r.apply(TransportCommand::Seek(25));
        r.apply(TransportCommand::Play);

        let mut out = StereoBuffer::silence(3);
        r.render(&mut out);
        assert_eq!(out[2].left, 27.0);
    }

    #[test]
    fn test_process_commands_drains_queue() {
        let (mut tx, mut rx) = command_channel();
        let (mut r, atomics) = renderer(100);
        tx.push(TransportCommand::Load(ramp(10, 100))).unwrap();
        tx.push(TransportCommand::Seek(4)).unwrap();
        tx.push(TransportCommand::Play).unwrap();

        r.process_commands(&mut rx);
        assert!(atomics.is_playing());
        assert_eq!(atomics.position(), 4);
        assert!(rx.pop().is_err());
    }
}
