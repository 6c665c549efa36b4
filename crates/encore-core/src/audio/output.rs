//! cpal output streams
//!
//! ```text
//! ┌──────────────────┐   TransportCommand   ┌─────────────────────┐
//! │  Control thread  │───push()────────────►│   Command Queue     │
//! │ (session ticks)  │                      │  (lock-free SPSC)   │
//! └──────────────────┘                      └──────────┬──────────┘
//!         ▲                                            │ pop()
//!         │ Relaxed atomics                            ▼
//! ┌──────────────────┐                      ┌─────────────────────┐
//! │ TransportAtomics │◄─────────────────────│  cpal Audio Thread  │
//! │   (lock-free)    │     sync writes      │  (owns AudioSource) │
//! └──────────────────┘                      └─────────────────────┘
//! ```
//!
//! The stream callback owns an [`AudioSource`] that renders into a
//! pre-allocated [`StereoBuffer`], which is then spread across the device's
//! channel layout.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::config::{AudioConfig, MAX_BUFFER_SIZE};
use super::device::{resolve_device, Direction};
use super::error::{AudioError, AudioResult};
use crate::types::StereoBuffer;

/// Renders audio on the device thread
pub trait AudioSource: Send + 'static {
    /// Fill `output` (already sized to the callback's frame count)
    fn render(&mut self, output: &mut StereoBuffer);
}

/// Keeps an output stream alive; drop to stop audio
pub struct OutputHandle {
    _stream: Stream,
    sample_rate: u32,
    buffer_size: u32,
}

impl OutputHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// One-way output latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }
}

/// Callback state owned by the stream
struct CallbackState<S> {
    source: S,
    buffer: StereoBuffer,
}

impl<S: AudioSource> CallbackState<S> {
    fn new(source: S) -> Self {
        Self {
            source,
            buffer: StereoBuffer::silence(MAX_BUFFER_SIZE),
        }
    }

    fn process(&mut self, n_frames: usize) {
        // RT-safe: buffer was allocated at MAX_BUFFER_SIZE
        self.buffer.set_len_from_capacity(n_frames.min(MAX_BUFFER_SIZE));
        self.buffer.fill_silence();
        self.source.render(&mut self.buffer);
    }
}

/// Open the configured output device and start streaming
///
/// `make_source` receives the negotiated device sample rate so the source
/// can render at the device clock.
pub fn start_output<S, F>(config: &AudioConfig, make_source: F) -> AudioResult<OutputHandle>
where
    S: AudioSource,
    F: FnOnce(u32) -> S,
{
    let device = resolve_device(config.output_device.as_ref(), Direction::Output)?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio output device: {}", device_name);

    let supported = get_output_config(&device, config)?;
    let sample_rate = supported.sample_rate().0;
    let buffer_size = config.buffer_size.frames();

    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    log::info!(
        "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        sample_rate,
        buffer_size,
        config.buffer_size.latency_ms(sample_rate)
    );

    let state = Arc::new(Mutex::new(CallbackState::new(make_source(sample_rate))));
    let stream = build_output_stream(&device, &stream_config, state)?;
    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

    Ok(OutputHandle {
        _stream: stream,
        sample_rate,
        buffer_size,
    })
}

/// Pick an f32 stereo config at the requested rate
fn get_output_config(
    device: &cpal::Device,
    config: &AudioConfig,
) -> AudioResult<cpal::SupportedStreamConfig> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    let target = config.target_sample_rate();
    let in_range = |c: &cpal::SupportedStreamConfigRange| {
        target >= c.min_sample_rate().0 && target <= c.max_sample_rate().0
    };

    let best = supported_configs
        .iter()
        .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 2 && in_range(c))
        .or_else(|| {
            supported_configs
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 1)
        })
        .ok_or_else(|| AudioError::ConfigError("No f32 output configuration".to_string()))?;

    let sample_rate = if in_range(best) {
        cpal::SampleRate(target)
    } else {
        let fallback = best.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz (tracks will be resampled)",
            target,
            fallback.0
        );
        fallback
    };

    Ok(best.clone().with_sample_rate(sample_rate))
}

fn build_output_stream<S: AudioSource>(
    device: &cpal::Device,
    config: &StreamConfig,
    state: Arc<Mutex<CallbackState<S>>>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let Ok(mut state) = state.lock() else {
                    data.fill(0.0);
                    return;
                };
                let n_frames = data.len() / channels.max(1);
                state.process(n_frames);

                let samples = state.buffer.as_slice();
                for (i, frame) in data.chunks_mut(channels).enumerate() {
                    match samples.get(i) {
                        Some(sample) if channels == 1 => frame[0] = (sample.left + sample.right) * 0.5,
                        Some(sample) => {
                            frame[0] = sample.left;
                            frame[1] = sample.right;
                            for ch in frame.iter_mut().skip(2) {
                                *ch = 0.0;
                            }
                        }
                        None => frame.fill(0.0),
                    }
                }
            },
            move |err| {
                log::error!("Output audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    struct Constant(f32);

    impl AudioSource for Constant {
        fn render(&mut self, output: &mut StereoBuffer) {
            for sample in output.as_mut_slice() {
                *sample = StereoSample::mono(self.0);
            }
        }
    }

    #[test]
    fn test_callback_state_sizes_buffer() {
        let mut state = CallbackState::new(Constant(0.5));
        state.process(256);
        assert_eq!(state.buffer.len(), 256);
        assert!(state.buffer.as_slice().iter().all(|s| s.left == 0.5));

        // Larger than pre-allocated capacity is clamped
        state.process(MAX_BUFFER_SIZE * 2);
        assert_eq!(state.buffer.len(), MAX_BUFFER_SIZE);
    }
}
