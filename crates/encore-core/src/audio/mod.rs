//! Audio device layer
//!
//! Output streams for the playback backends and microphone capture for pitch
//! analysis, both on cpal.
//!
//! The device threads never take locks shared with the control thread except
//! the stream callback state mutex; commands travel over lock-free ring
//! buffers and state comes back through relaxed atomics.

mod config;
mod device;
mod error;
mod input;
mod output;

pub use config::{AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE};
pub use device::{find_device_by_id, has_device, list_devices, resolve_device, AudioDevice, Direction};
pub use error::{AudioError, AudioResult};
pub use input::{start_input, InputHandle};
pub use output::{start_output, AudioSource, OutputHandle};
