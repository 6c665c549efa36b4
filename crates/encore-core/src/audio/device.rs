//! Audio device enumeration and lookup
//!
//! Lists output (backing track) and input (microphone) devices from every
//! available cpal host and resolves configured [`DeviceId`]s to devices.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Device direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Output,
    Input,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Direction::Output => "output",
            Direction::Input => "input",
        }
    }
}

/// Get a human-readable name for a host ID
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

fn get_host_by_name(name: &str) -> Option<Host> {
    cpal::available_hosts()
        .into_iter()
        .find(|id| host_name(*id) == name)
        .and_then(|id| cpal::host_from_id(id).ok())
}

fn devices_of(host: &Host, direction: Direction) -> Option<Vec<cpal::Device>> {
    let devices = match direction {
        Direction::Output => host.output_devices().map(|d| d.collect()),
        Direction::Input => host.input_devices().map(|d| d.collect()),
    };
    match devices {
        Ok(devices) => Some(devices),
        Err(e) => {
            log::debug!("Could not enumerate {} devices: {}", direction.label(), e);
            None
        }
    }
}

/// Information about an audio device
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Device identifier for configuration (includes host info)
    pub id: DeviceId,
    /// Host backend name (e.g., "ALSA", "CoreAudio")
    pub host: String,
    /// Whether this is the system default device for its host
    pub is_default: bool,
}

impl std::fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id.display_label())
    }
}

/// List devices for a direction from all hosts
///
/// Default devices come first, then devices sorted by host and name.
pub fn list_devices(direction: Direction) -> AudioResult<Vec<AudioDevice>> {
    let mut all_devices = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let host_label = host_name(host_id);

        let default_name = match direction {
            Direction::Output => host.default_output_device(),
            Direction::Input => host.default_input_device(),
        }
        .and_then(|d| d.name().ok());

        let Some(devices) = devices_of(&host, direction) else {
            continue;
        };
        for device in devices {
            let Ok(name) = device.name() else {
                continue;
            };
            all_devices.push(AudioDevice {
                is_default: default_name.as_ref() == Some(&name),
                id: DeviceId::with_host(&name, &host_label),
                host: host_label.clone(),
            });
        }
    }

    if all_devices.is_empty() {
        return Err(AudioError::NoDevices(direction.label()));
    }

    all_devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.host.cmp(&b.host))
            .then_with(|| a.id.name.cmp(&b.id.name))
    });

    log::debug!("Enumerated {} {} devices", all_devices.len(), direction.label());
    Ok(all_devices)
}

/// Find a device by its ID
///
/// Uses the host named in the ID if available, otherwise searches all hosts.
pub fn find_device_by_id(id: &DeviceId, direction: Direction) -> AudioResult<cpal::Device> {
    let matches = |d: &cpal::Device| d.name().ok().as_ref() == Some(&id.name);

    if let Some(host) = id.host.as_deref().and_then(get_host_by_name) {
        return devices_of(&host, direction)
            .and_then(|devices| devices.into_iter().find(matches))
            .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()));
    }

    for host_id in cpal::available_hosts() {
        let Ok(host) = cpal::host_from_id(host_id) else {
            continue;
        };
        if let Some(device) = devices_of(&host, direction).and_then(|d| d.into_iter().find(matches)) {
            return Ok(device);
        }
    }

    Err(AudioError::DeviceNotFound(id.display_label()))
}

/// Configured device, or the default host's default device
pub fn resolve_device(id: Option<&DeviceId>, direction: Direction) -> AudioResult<cpal::Device> {
    if let Some(id) = id {
        return find_device_by_id(id, direction);
    }
    let host = cpal::default_host();
    match direction {
        Direction::Output => host.default_output_device(),
        Direction::Input => host.default_input_device(),
    }
    .ok_or_else(|| AudioError::NoDefaultDevice(direction.label().to_string()))
}

/// Whether any device of this direction can be opened
pub fn has_device(id: Option<&DeviceId>, direction: Direction) -> bool {
    resolve_device(id, direction).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_enumeration() {
        // Depends on the machine; CI usually has no devices
        for direction in [Direction::Output, Direction::Input] {
            match list_devices(direction) {
                Ok(devices) => {
                    assert!(!devices.is_empty());
                    for device in &devices {
                        println!("  - {} (default: {})", device, device.is_default);
                    }
                }
                Err(AudioError::NoDevices(label)) => assert_eq!(label, direction.label()),
                Err(e) => println!("Error enumerating devices: {}", e),
            }
        }
    }

    #[test]
    fn test_unknown_device_not_found() {
        let id = DeviceId::with_host("definitely-not-a-device", "NoSuchHost");
        assert!(find_device_by_id(&id, Direction::Output).is_err());
    }
}
