//! Lock-free transport command queue
//!
//! The control thread sends [`TransportCommand`]s to the device thread over
//! an `rtrb` SPSC ring buffer; the device thread drains the queue at the
//! start of every callback, so state never changes mid-buffer.

use std::sync::Arc;

use crate::audio_file::DecodedTrack;

/// Commands sent from the control thread to a backend's audio thread
pub enum TransportCommand {
    /// Replace the current track; playback stops at frame 0
    ///
    /// The track is behind an `Arc` so the command stays pointer-sized.
    Load(Arc<DecodedTrack>),
    /// Drop the current track and output silence
    Unload,
    Play,
    Pause,
    /// Jump to a frame of the track (track sample rate)
    Seek(u64),
    /// Internal A-B wrap bounds in track frames, `None` to disable
    SetLoop(Option<(u64, u64)>),
    /// Transpose in semitones (ignored by backends without pitch shifting)
    SetPitch(f64),
}

impl std::fmt::Debug for TransportCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportCommand::Load(track) => write!(f, "Load({} frames)", track.frames()),
            TransportCommand::Unload => write!(f, "Unload"),
            TransportCommand::Play => write!(f, "Play"),
            TransportCommand::Pause => write!(f, "Pause"),
            TransportCommand::Seek(frame) => write!(f, "Seek({})", frame),
            TransportCommand::SetLoop(bounds) => write!(f, "SetLoop({:?})", bounds),
            TransportCommand::SetPitch(semitones) => write!(f, "SetPitch({})", semitones),
        }
    }
}

/// Capacity of the command queue
///
/// A session sends a handful of commands per user action; 256 leaves room
/// for bursts such as restoring a saved section while seeking.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Create a new command channel (producer/consumer pair)
///
/// Producer is owned by the control thread, consumer by the audio thread.
pub fn command_channel() -> (rtrb::Producer<TransportCommand>, rtrb::Consumer<TransportCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}
