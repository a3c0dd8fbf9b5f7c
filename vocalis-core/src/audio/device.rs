//! Audio input device enumeration.

use serde::{Deserialize, Serialize};

/// Metadata about an audio input device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    /// Whether this is the system default input device.
    pub is_default: bool,
    /// Channel count of the device's default input configuration.
    pub channels: u16,
    /// Sample rate of the device's default input configuration (Hz).
    pub default_sample_rate: u32,
}

/// Default device first, then by name.
pub fn sort_devices(devices: &mut [DeviceInfo]) {
    devices.sort_by_key(|d| (!d.is_default, d.name.to_ascii_lowercase()));
}

/// List all available audio input devices on the system.
///
/// Returns an empty `Vec` if no devices exist or the host cannot enumerate
/// them.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = match host.input_devices() {
        Ok(devices) => devices,
        Err(e) => {
            tracing::warn!("failed to enumerate input devices: {e}");
            return Vec::new();
        }
    };

    let mut list: Vec<DeviceInfo> = devices
        .enumerate()
        .map(|(idx, device)| {
            let name = device
                .name()
                .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
            let (channels, default_sample_rate) = match device.default_input_config() {
                Ok(cfg) => (cfg.channels(), cfg.sample_rate().0),
                Err(e) => {
                    tracing::debug!(device = %name, "no default input config: {e}");
                    (0, 0)
                }
            };
            DeviceInfo {
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                channels,
                default_sample_rate,
            }
        })
        .collect();
    sort_devices(&mut list);
    list
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    vec![]
}
