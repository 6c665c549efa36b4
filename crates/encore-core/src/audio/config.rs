//! Audio device configuration
//!
//! Device selection and buffer preferences for the playback output and the
//! microphone input.

use serde::{Deserialize, Serialize};

/// Maximum buffer size to pre-allocate (covers typical configurations)
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Default buffer size when no preference is specified (frames)
///
/// Karaoke playback tolerates more latency than live mixing, so this is a
/// safe value that works on most systems.
pub const DEFAULT_BUFFER_SIZE: u32 = 1024;

/// Default sample rate for the output stream (48kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Preferred buffer size for audio streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the engine pick [`DEFAULT_BUFFER_SIZE`]
    #[default]
    Default,
    /// Request a specific buffer size in frames (clamped to 64..8192)
    Fixed(u32),
}

impl BufferSize {
    /// Buffer size in frames to request from the device
    pub fn frames(&self) -> u32 {
        match self {
            BufferSize::Default => DEFAULT_BUFFER_SIZE,
            BufferSize::Fixed(frames) => (*frames).clamp(64, MAX_BUFFER_SIZE as u32),
        }
    }

    /// Latency in milliseconds for a given sample rate
    pub fn latency_ms(&self, sample_rate: u32) -> f32 {
        (self.frames() as f32 / sample_rate.max(1) as f32) * 1000.0
    }
}

/// Audio device identifier
///
/// Includes both the device name and the host backend (ALSA, CoreAudio, ...)
/// so devices from different hosts can be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier; `None` searches every host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Display label including the host if known
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the audio streams
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Backing-track output device (None = system default)
    pub output_device: Option<DeviceId>,
    /// Microphone device (None = system default)
    pub input_device: Option<DeviceId>,
    /// Preferred output buffer size
    pub buffer_size: BufferSize,
    /// Preferred output sample rate (None = [`DEFAULT_SAMPLE_RATE`])
    pub sample_rate: Option<u32>,
}

impl AudioConfig {
    /// Set the preferred sample rate
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_frames_clamped() {
        assert_eq!(BufferSize::Default.frames(), DEFAULT_BUFFER_SIZE);
        assert_eq!(BufferSize::Fixed(16).frames(), 64);
        assert_eq!(BufferSize::Fixed(100_000).frames(), MAX_BUFFER_SIZE as u32);
        assert!((BufferSize::Fixed(480).latency_ms(48000) - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_device_label() {
        assert_eq!(DeviceId::new("Built-in").display_label(), "Built-in");
        assert_eq!(DeviceId::with_host("hw:0", "ALSA").display_label(), "[ALSA] hw:0");
    }

    #[test]
    fn test_config_yaml_defaults() {
        let config: AudioConfig = serde_yaml::from_str("sample_rate: 44100").unwrap();
        assert_eq!(config.target_sample_rate(), 44100);
        assert_eq!(config.buffer_size, BufferSize::Default);
        assert!(config.output_device.is_none());
    }
}
