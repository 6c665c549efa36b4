//! Backing track decoding
//!
//! Decodes MP3/FLAC/WAV files into stereo PCM at the file's native rate with
//! Symphonia. Mono files are duplicated to both channels; files with more
//! than two channels keep the first pair.

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::types::{frames_to_secs, StereoSample};

/// Decoding errors
#[derive(Error, Debug)]
pub enum DecodeError {
    /// URL scheme the decoder cannot open (e.g. remote http streams)
    #[error("Unsupported track URL: {0}")]
    UnsupportedUrl(String),

    /// File could not be opened
    #[error("Failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Container or codec not recognized
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Decoding produced no audio
    #[error("No audio decoded from {0:?}")]
    Empty(PathBuf),
}

/// Fully decoded stereo track
#[derive(Debug, Clone)]
pub struct DecodedTrack {
    pub samples: Vec<StereoSample>,
    pub sample_rate: u32,
}

impl DecodedTrack {
    /// Build from interleaved samples with `channels` channels
    pub fn from_interleaved(interleaved: &[f32], channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let samples = interleaved
            .chunks_exact(channels)
            .map(|frame| match frame {
                [mono] => StereoSample::mono(*mono),
                [left, right, ..] => StereoSample::new(*left, *right),
                [] => StereoSample::silence(),
            })
            .collect();
        Self { samples, sample_rate }
    }

    pub fn frames(&self) -> u64 {
        self.samples.len() as u64
    }

    pub fn duration_secs(&self) -> f64 {
        frames_to_secs(self.frames(), self.sample_rate)
    }
}

/// Map a track URL to a local path
///
/// Accepts plain paths and `file://` URLs.
pub fn resolve_url(url: &str) -> Result<PathBuf, DecodeError> {
    if let Some(path) = url.strip_prefix("file://") {
        return Ok(PathBuf::from(path));
    }
    if url.contains("://") {
        return Err(DecodeError::UnsupportedUrl(url.to_string()));
    }
    Ok(PathBuf::from(url))
}

/// Decode a track URL
pub fn decode_url(url: &str) -> Result<DecodedTrack, DecodeError> {
    decode_file(&resolve_url(url)?)
}

/// Decode an audio file to stereo f32 samples using Symphonia
pub fn decode_file(path: &Path) -> Result<DecodedTrack, DecodeError> {
    let file = File::open(path).map_err(|source| DecodeError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::UnsupportedFormat("No audio track found".to_string()))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| DecodeError::UnsupportedFormat("Unknown sample rate".to_string()))?;
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                log::warn!("Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("Error decoding packet: {}", e);
                continue;
            }
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            channels = spec.channels.count();
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            interleaved.extend_from_slice(buf.samples());
        }
    }

    if interleaved.is_empty() {
        return Err(DecodeError::Empty(path.to_path_buf()));
    }

    let track = DecodedTrack::from_interleaved(&interleaved, channels, sample_rate);
    log::info!(
        "Decoded {:?}: {:.1}s, {} channels @ {}Hz",
        path.file_name().unwrap_or_default(),
        track.duration_secs(),
        channels,
        sample_rate
    );
    Ok(track)
}
