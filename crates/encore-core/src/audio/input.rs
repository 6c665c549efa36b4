//! cpal microphone capture
//!
//! The input callback downmixes each frame to mono and pushes it into a
//! lock-free ring buffer. The control thread drains the ring at its own
//! cadence. When the ring is full, new samples are dropped until the reader
//! catches up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use super::config::AudioConfig;
use super::device::{resolve_device, Direction};
use super::error::{AudioError, AudioResult};

/// Seconds of audio the capture ring can hold
const CAPTURE_RING_SECONDS: usize = 2;

/// A running microphone stream
///
/// Dropping the handle stops capture.
pub struct InputHandle {
    _stream: Stream,
    samples: rtrb::Consumer<f32>,
    failed: Arc<AtomicBool>,
    sample_rate: u32,
}

impl InputHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Whether the device reported a stream error
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    /// Move every captured sample into `out`
    pub fn drain_into(&mut self, out: &mut Vec<f32>) -> usize {
        let available = self.samples.slots();
        if available == 0 {
            return 0;
        }
        match self.samples.read_chunk(available) {
            Ok(chunk) => {
                out.extend(chunk);
                available
            }
            Err(_) => 0,
        }
    }
}

/// Open the configured input device and start capturing
pub fn start_input(config: &AudioConfig) -> AudioResult<InputHandle> {
    let device = resolve_device(config.input_device.as_ref(), Direction::Input)?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported = device
        .supported_input_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .find(|c| c.sample_format() == SampleFormat::F32)
        .ok_or_else(|| AudioError::ConfigError("No f32 input configuration".to_string()))?
        .with_max_sample_rate();

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let stream_config: StreamConfig = supported.into();

    log::info!(
        "Microphone: {} ({} channels, {}Hz)",
        device_name,
        channels,
        sample_rate
    );

    let (mut producer, consumer) =
        rtrb::RingBuffer::<f32>::new(sample_rate as usize * CAPTURE_RING_SECONDS);
    let failed = Arc::new(AtomicBool::new(false));
    let failed_flag = failed.clone();

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                for frame in data.chunks(channels.max(1)) {
                    let mono = frame.iter().sum::<f32>() / frame.len() as f32;
                    if producer.push(mono).is_err() {
                        break;
                    }
                }
            },
            move |err| {
                log::error!("Input audio stream error: {}", err);
                failed_flag.store(true, Ordering::Relaxed);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

    Ok(InputHandle {
        _stream: stream,
        samples: consumer,
        failed,
        sample_rate,
    })
}
