//! Session-level error type

use thiserror::Error;

use crate::ab_loop::LoopError;
use crate::lyrics::LyricsError;
use crate::pitch::AnalysisError;
use crate::playback::PlaybackError;
use crate::sections::StoreError;

/// Any failure surfaced by [`PracticeSession`](crate::session::PracticeSession)
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Loop(#[from] LoopError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lyrics(#[from] LyricsError),

    /// Saving needs both loop points
    #[error("No complete loop region to save")]
    NoLoopRegion,

    #[error("No saved section with id {0}")]
    SectionNotFound(String),

    #[error("No track loaded")]
    NoTrack,
}

pub type SessionResult<T> = Result<T, SessionError>;
