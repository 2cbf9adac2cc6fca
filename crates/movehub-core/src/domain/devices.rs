//! Device registry: what kind of thing is plugged into a port.
//!
//! The hub announces every attached device with a 16-bit type id.  The
//! session only needs to know whether that id is a motor, a light or a
//! sensor, so classification is a total function over a fixed table with an
//! `Unknown` fallback.

use serde::{Deserialize, Serialize};

/// Well-known ports of the Technic Move Hub.
pub mod ports {
    /// Left drive motor.
    pub const DRIVE_LEFT: u8 = 50;
    /// Right drive motor.
    pub const DRIVE_RIGHT: u8 = 51;
    /// Steering motor.  Its Port Value carries the steering encoder position.
    pub const STEERING: u8 = 52;
    /// Built-in lights.
    pub const LIGHTS: u8 = 53;
    /// Virtual port combining drive, steering and lights (0x36).
    pub const COMBINED: u8 = 0x36;
}

/// Broad class of an attached device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceCapability {
    Motor,
    Light,
    Sensor,
    Unknown,
}

/// Classifies a device type id.
///
/// # Examples
///
/// ```rust
/// use movehub_core::{classify, DeviceCapability};
///
/// assert_eq!(classify(0x0001), DeviceCapability::Motor);
/// assert_eq!(classify(0x0058), DeviceCapability::Light);
/// assert_eq!(classify(0x1234), DeviceCapability::Unknown);
/// ```
pub fn classify(type_id: u16) -> DeviceCapability {
    match type_id {
        0x01 | 0x02 | 0x2E | 0x2F | 0x56 | 0x57 => DeviceCapability::Motor,
        0x08 | 0x58 => DeviceCapability::Light,
        0x14 | 0x39 | 0x3A | 0x3B => DeviceCapability::Sensor,
        _ => DeviceCapability::Unknown,
    }
}

/// Human-readable name for a device type id, as shown by `status`.
pub fn device_name(type_id: u16) -> String {
    let name = match type_id {
        0x01 => "MEDIUM_MOTOR",
        0x02 => "TRAIN_MOTOR",
        0x08 => "LIGHT",
        0x14 => "VOLTAGE",
        0x2E => "TECHNIC_LARGE_MOTOR",
        0x2F => "TECHNIC_XLARGE_MOTOR",
        0x39 => "TECHNIC_HUB_ACCELEROMETER",
        0x3A => "TECHNIC_HUB_GYRO",
        0x3B => "TECHNIC_HUB_TILT",
        0x56 => "TECHNIC_MOVE_HUB_DRIVE_MOTOR",
        0x57 => "TECHNIC_MOVE_HUB_STEERING_MOTOR",
        0x58 => "TECHNIC_MOVE_HUB_LIGHTS",
        other => return format!("UNKNOWN_0x{other:04x}"),
    };
    name.to_string()
}

/// One entry of the session's attached-device table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedDevice {
    pub port: u8,
    pub type_id: u16,
    pub capability: DeviceCapability,
    /// For virtual ports, the two physical ports it combines.
    pub virtual_of: Option<(u8, u8)>,
}

impl AttachedDevice {
    pub fn new(port: u8, type_id: u16) -> Self {
        Self {
            port,
            type_id,
            capability: classify(type_id),
            virtual_of: None,
        }
    }

    pub fn new_virtual(port: u8, type_id: u16, port_a: u8, port_b: u8) -> Self {
        Self {
            virtual_of: Some((port_a, port_b)),
            ..Self::new(port, type_id)
        }
    }

    pub fn name(&self) -> String {
        device_name(self.type_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_every_table_entry() {
        for id in [0x01, 0x02, 0x2E, 0x2F, 0x56, 0x57] {
            assert_eq!(classify(id), DeviceCapability::Motor, "id 0x{id:02x}");
        }
        for id in [0x08, 0x58] {
            assert_eq!(classify(id), DeviceCapability::Light, "id 0x{id:02x}");
        }
        for id in [0x14, 0x39, 0x3A, 0x3B] {
            assert_eq!(classify(id), DeviceCapability::Sensor, "id 0x{id:02x}");
        }
    }

    #[test]
    fn test_classify_unlisted_ids_are_unknown() {
        assert_eq!(classify(0x0000), DeviceCapability::Unknown);
        assert_eq!(classify(0x0003), DeviceCapability::Unknown);
        assert_eq!(classify(0xFFFF), DeviceCapability::Unknown);
    }

    #[test]
    fn test_device_name_unknown_is_hex() {
        assert_eq!(device_name(0x0042), "UNKNOWN_0x0042");
        assert_eq!(device_name(0x0001), "MEDIUM_MOTOR");
    }

    #[test]
    fn test_attached_device_derives_capability() {
        let dev = AttachedDevice::new(0, 0x01);
        assert_eq!(dev.capability, DeviceCapability::Motor);
        assert_eq!(dev.virtual_of, None);
    }

    #[test]
    fn test_virtual_device_keeps_member_ports() {
        let dev = AttachedDevice::new_virtual(ports::COMBINED, 0x57, 50, 51);
        assert_eq!(dev.virtual_of, Some((50, 51)));
        assert_eq!(dev.capability, DeviceCapability::Motor);
    }
}
