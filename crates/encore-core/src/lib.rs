//! Encore Core - Playback, looping, lyric sync and pitch scoring for karaoke practice

pub mod ab_loop;
pub mod audio;
pub mod audio_file;
pub mod config;
pub mod error;
pub mod lyrics;
pub mod metronome;
pub mod music;
pub mod pitch;
pub mod playback;
pub mod scheduler;
pub mod sections;
pub mod session;
pub mod timestretch;
pub mod types;

pub use error::{SessionError, SessionResult};
pub use session::{PracticeSession, SessionEvent, SongMetadata};
pub use types::*;
