//! Device and stream errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    /// Host reports no devices of the requested direction ("output"/"input")
    #[error("No {0} devices available")]
    NoDevices(&'static str),

    #[error("No default {0} device")]
    NoDefaultDevice(String),

    /// Configured device is not (or no longer) present
    #[error("Configured audio device not found: {0}")]
    DeviceNotFound(String),

    /// Device rejected the stream configuration
    #[error("Unusable device configuration: {0}")]
    ConfigError(String),

    #[error("Could not open audio stream: {0}")]
    StreamBuildError(String),

    #[error("Could not start audio stream: {0}")]
    StreamPlayError(String),
}

pub type AudioResult<T> = Result<T, AudioError>;
