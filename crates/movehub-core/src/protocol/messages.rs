//! LEGO Wireless Protocol 3.0 message types and typed notification payloads.
//!
//! Only the subset of the protocol that a Move Hub session needs is parsed
//! into typed values.  Everything else still decodes, but ends up in
//! [`Notification::Unsupported`] so that the session can log and move on.

use serde::{Deserialize, Serialize};

use crate::protocol::codec::{encode, Message, ProtocolError};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size of the common header: length, hub id, message type.
pub const HEADER_SIZE: usize = 3;

/// Hub id of a directly connected hub.
pub const HUB_ID: u8 = 0x00;

/// Largest frame representable with a single-byte length field.
pub const MAX_MESSAGE_LEN: usize = 127;

// ── Message type codes ────────────────────────────────────────────────────────

/// Message type byte at offset 2 of every frame.
///
/// Codes that this crate does not name decode to [`MessageType::Unknown`]
/// instead of failing, because the hub is free to send notifications we have
/// never seen before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    // Hub related
    HubProperties,
    HubActions,
    HubAlerts,
    HubAttachedIo,
    GenericError,
    HwNetworkCommands,
    FwUpdateBootMode,
    FwUpdateLockMemory,
    FwUpdateLockStatusRequest,
    FwLockStatus,
    // Port information
    PortInformationRequest,
    PortModeInformationRequest,
    PortInputFormatSetupSingle,
    PortInputFormatSetupCombined,
    PortInformation,
    PortModeInformation,
    PortValueSingle,
    PortValueCombined,
    PortInputFormatSingle,
    PortInputFormatCombined,
    // Output
    PortOutputCommand,
    PortOutputCommandFeedback,
    /// Any code not listed above.
    Unknown(u8),
}

impl MessageType {
    /// Maps a wire byte to a message type.  Never fails.
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => MessageType::HubProperties,
            0x02 => MessageType::HubActions,
            0x03 => MessageType::HubAlerts,
            0x04 => MessageType::HubAttachedIo,
            0x05 => MessageType::GenericError,
            0x08 => MessageType::HwNetworkCommands,
            0x10 => MessageType::FwUpdateBootMode,
            0x11 => MessageType::FwUpdateLockMemory,
            0x12 => MessageType::FwUpdateLockStatusRequest,
            0x13 => MessageType::FwLockStatus,
            0x21 => MessageType::PortInformationRequest,
            0x22 => MessageType::PortModeInformationRequest,
            0x41 => MessageType::PortInputFormatSetupSingle,
            0x42 => MessageType::PortInputFormatSetupCombined,
            0x43 => MessageType::PortInformation,
            0x44 => MessageType::PortModeInformation,
            0x45 => MessageType::PortValueSingle,
            0x46 => MessageType::PortValueCombined,
            0x47 => MessageType::PortInputFormatSingle,
            0x48 => MessageType::PortInputFormatCombined,
            0x81 => MessageType::PortOutputCommand,
            0x82 => MessageType::PortOutputCommandFeedback,
            other => MessageType::Unknown(other),
        }
    }

    /// The wire byte for this type.
    pub fn code(self) -> u8 {
        match self {
            MessageType::HubProperties => 0x01,
            MessageType::HubActions => 0x02,
            MessageType::HubAlerts => 0x03,
            MessageType::HubAttachedIo => 0x04,
            MessageType::GenericError => 0x05,
            MessageType::HwNetworkCommands => 0x08,
            MessageType::FwUpdateBootMode => 0x10,
            MessageType::FwUpdateLockMemory => 0x11,
            MessageType::FwUpdateLockStatusRequest => 0x12,
            MessageType::FwLockStatus => 0x13,
            MessageType::PortInformationRequest => 0x21,
            MessageType::PortModeInformationRequest => 0x22,
            MessageType::PortInputFormatSetupSingle => 0x41,
            MessageType::PortInputFormatSetupCombined => 0x42,
            MessageType::PortInformation => 0x43,
            MessageType::PortModeInformation => 0x44,
            MessageType::PortValueSingle => 0x45,
            MessageType::PortValueCombined => 0x46,
            MessageType::PortInputFormatSingle => 0x47,
            MessageType::PortInputFormatCombined => 0x48,
            MessageType::PortOutputCommand => 0x81,
            MessageType::PortOutputCommandFeedback => 0x82,
            MessageType::Unknown(code) => code,
        }
    }
}

// ── Hub properties ────────────────────────────────────────────────────────────

/// Hub property ids the session queries after connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum HubProperty {
    AdvertisingName = 0x01,
    FirmwareVersion = 0x03,
    HardwareVersion = 0x04,
    BatteryVoltage = 0x06,
    ManufacturerName = 0x08,
}

impl HubProperty {
    /// Properties requested on connect, in request order.
    pub const ALL: [HubProperty; 5] = [
        HubProperty::AdvertisingName,
        HubProperty::FirmwareVersion,
        HubProperty::HardwareVersion,
        HubProperty::BatteryVoltage,
        HubProperty::ManufacturerName,
    ];
}

impl TryFrom<u8> for HubProperty {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(HubProperty::AdvertisingName),
            0x03 => Ok(HubProperty::FirmwareVersion),
            0x04 => Ok(HubProperty::HardwareVersion),
            0x06 => Ok(HubProperty::BatteryVoltage),
            0x08 => Ok(HubProperty::ManufacturerName),
            _ => Err(()),
        }
    }
}

/// Property operation: ask the hub to send the current value once.
pub const PROPERTY_OP_REQUEST_UPDATE: u8 = 0x05;

/// Property operation: the hub reporting a value.
pub const PROPERTY_OP_UPDATE: u8 = 0x06;

/// A decoded hub property update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    Name(String),
    FirmwareVersion(String),
    HardwareVersion(String),
    /// Battery charge in percent.
    BatteryLevel(u8),
    Manufacturer(String),
}

/// Formats a 4-byte little-endian version number as
/// `major.minor.bugfix.build`, e.g. `1.0.00.0224`.
///
/// The top nibble of the last byte is the major version, the low nibble the
/// minor version, the third byte the bugfix number and the first two bytes
/// the build number.
pub fn format_version(bytes: &[u8]) -> Result<String, ProtocolError> {
    if bytes.len() < 4 {
        return Err(ProtocolError::MalformedMessage(format!(
            "version needs 4 bytes, got {}",
            bytes.len()
        )));
    }
    let major = bytes[3] >> 4;
    let minor = bytes[3] & 0x0F;
    let bugfix = bytes[2];
    let build = u16::from_le_bytes([bytes[0], bytes[1]]);
    Ok(format!("{major}.{minor}.{bugfix:02}.{build:04}"))
}

fn parse_property(payload: &[u8]) -> Result<Option<PropertyValue>, ProtocolError> {
    if payload.len() < 2 {
        return Err(ProtocolError::MalformedMessage(
            "hub property payload shorter than 2 bytes".to_string(),
        ));
    }
    if payload[1] != PROPERTY_OP_UPDATE {
        return Ok(None);
    }
    let value = &payload[2..];
    let text = || String::from_utf8_lossy(value).trim_end_matches('\0').to_string();

    let parsed = match HubProperty::try_from(payload[0]) {
        Ok(HubProperty::AdvertisingName) => PropertyValue::Name(text()),
        Ok(HubProperty::ManufacturerName) => PropertyValue::Manufacturer(text()),
        Ok(HubProperty::FirmwareVersion) => PropertyValue::FirmwareVersion(format_version(value)?),
        Ok(HubProperty::HardwareVersion) => PropertyValue::HardwareVersion(format_version(value)?),
        Ok(HubProperty::BatteryVoltage) => {
            let level = value.first().copied().ok_or_else(|| {
                ProtocolError::MalformedMessage("battery property without value".to_string())
            })?;
            PropertyValue::BatteryLevel(level)
        }
        Err(()) => return Ok(None),
    };
    Ok(Some(parsed))
}

// ── Hub attached IO ───────────────────────────────────────────────────────────

/// Event carried by a Hub Attached IO notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachedIoEvent {
    Detached,
    Attached {
        type_id: u16,
    },
    /// A virtual port made of two physical ports.
    AttachedVirtual {
        type_id: u16,
        port_a: u8,
        port_b: u8,
    },
}

fn parse_attached_io(payload: &[u8]) -> Result<Notification, ProtocolError> {
    let short = || ProtocolError::MalformedMessage(format!("attached io payload too short: {} bytes", payload.len()));
    if payload.len() < 2 {
        return Err(short());
    }
    let port = payload[0];
    let event = match payload[1] {
        0x00 => AttachedIoEvent::Detached,
        0x01 => {
            if payload.len() < 4 {
                return Err(short());
            }
            AttachedIoEvent::Attached {
                type_id: u16::from_le_bytes([payload[2], payload[3]]),
            }
        }
        0x02 => {
            if payload.len() < 6 {
                return Err(short());
            }
            AttachedIoEvent::AttachedVirtual {
                type_id: u16::from_le_bytes([payload[2], payload[3]]),
                port_a: payload[4],
                port_b: payload[5],
            }
        }
        other => {
            return Err(ProtocolError::MalformedMessage(format!(
                "unknown attached io event 0x{other:02x}"
            )))
        }
    };
    Ok(Notification::AttachedIo { port, event })
}

// ── Generic error ─────────────────────────────────────────────────────────────

/// Error codes of a Generic Error Message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Ack,
    Mack,
    BufferOverflow,
    Timeout,
    CommandNotRecognized,
    InvalidUse,
    Overcurrent,
    InternalError,
    Unknown(u8),
}

impl From<u8> for ErrorCode {
    fn from(value: u8) -> Self {
        match value {
            0x01 => ErrorCode::Ack,
            0x02 => ErrorCode::Mack,
            0x03 => ErrorCode::BufferOverflow,
            0x04 => ErrorCode::Timeout,
            0x05 => ErrorCode::CommandNotRecognized,
            0x06 => ErrorCode::InvalidUse,
            0x07 => ErrorCode::Overcurrent,
            0x08 => ErrorCode::InternalError,
            other => ErrorCode::Unknown(other),
        }
    }
}

/// Payload of a Generic Error Message: which command failed and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericErrorReport {
    pub command_type: MessageType,
    pub code: ErrorCode,
}

// ── Port values ───────────────────────────────────────────────────────────────

/// A Port Value (Single) notification.  The value width depends on the
/// port mode, so the raw little-endian bytes are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortValue {
    pub port: u8,
    pub raw: Vec<u8>,
}

impl PortValue {
    /// Interprets the value as a signed little-endian integer of 1, 2 or 4 bytes.
    pub fn as_i32(&self) -> Option<i32> {
        match self.raw.as_slice() {
            [a] => Some(*a as i8 as i32),
            [a, b] => Some(i16::from_le_bytes([*a, *b]) as i32),
            [a, b, c, d] => Some(i32::from_le_bytes([*a, *b, *c, *d])),
            _ => None,
        }
    }
}

// ── Command feedback ──────────────────────────────────────────────────────────

/// Feedback bits reported per port in a Port Output Command Feedback message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedbackFlags(pub u8);

impl FeedbackFlags {
    pub const IN_PROGRESS: u8 = 0x01;
    pub const COMPLETED: u8 = 0x02;
    pub const DISCARDED: u8 = 0x04;
    pub const IDLE: u8 = 0x08;
    pub const BUSY: u8 = 0x10;

    pub fn in_progress(self) -> bool {
        self.0 & Self::IN_PROGRESS != 0
    }

    pub fn completed(self) -> bool {
        self.0 & Self::COMPLETED != 0
    }

    pub fn discarded(self) -> bool {
        self.0 & Self::DISCARDED != 0
    }

    pub fn idle(self) -> bool {
        self.0 & Self::IDLE != 0
    }

    /// True once the port has nothing left to do.
    pub fn finished(self) -> bool {
        self.completed() || self.idle()
    }
}

/// One `(port, flags)` entry of a feedback message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortFeedback {
    pub port: u8,
    pub flags: FeedbackFlags,
}

fn parse_feedback(payload: &[u8]) -> Result<Notification, ProtocolError> {
    if payload.is_empty() || payload.len() % 2 != 0 {
        return Err(ProtocolError::MalformedMessage(format!(
            "command feedback needs (port, flags) pairs, got {} bytes",
            payload.len()
        )));
    }
    let entries = payload
        .chunks_exact(2)
        .map(|pair| PortFeedback {
            port: pair[0],
            flags: FeedbackFlags(pair[1]),
        })
        .collect();
    Ok(Notification::CommandFeedback(entries))
}

// ── Notification ──────────────────────────────────────────────────────────────

/// A hub-to-host message interpreted according to its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    AttachedIo { port: u8, event: AttachedIoEvent },
    Property(PropertyValue),
    GenericError(GenericErrorReport),
    PortValue(PortValue),
    CommandFeedback(Vec<PortFeedback>),
    /// A well-formed message the session has no use for.
    Unsupported(Message),
}

impl Notification {
    /// Interprets a decoded message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedMessage`] if the payload of a known
    /// notification type is truncated or inconsistent.
    pub fn parse(message: &Message) -> Result<Notification, ProtocolError> {
        let payload = message.payload.as_slice();
        match message.message_type {
            MessageType::HubAttachedIo => parse_attached_io(payload),
            MessageType::HubProperties => Ok(match parse_property(payload)? {
                Some(value) => Notification::Property(value),
                None => Notification::Unsupported(message.clone()),
            }),
            MessageType::GenericError => {
                if payload.len() < 2 {
                    return Err(ProtocolError::MalformedMessage(
                        "generic error payload shorter than 2 bytes".to_string(),
                    ));
                }
                Ok(Notification::GenericError(GenericErrorReport {
                    command_type: MessageType::from_code(payload[0]),
                    code: ErrorCode::from(payload[1]),
                }))
            }
            MessageType::PortValueSingle => {
                if payload.len() < 2 {
                    return Err(ProtocolError::MalformedMessage(
                        "port value payload shorter than 2 bytes".to_string(),
                    ));
                }
                Ok(Notification::PortValue(PortValue {
                    port: payload[0],
                    raw: payload[1..].to_vec(),
                }))
            }
            MessageType::PortOutputCommandFeedback => parse_feedback(payload),
            _ => Ok(Notification::Unsupported(message.clone())),
        }
    }
}

// ── Outgoing requests ─────────────────────────────────────────────────────────

/// Hub action: switch the hub off.
pub const HUB_ACTION_SWITCH_OFF: u8 = 0x01;

/// Hub action: drop the BLE link but stay powered.
pub const HUB_ACTION_DISCONNECT: u8 = 0x02;

/// Builds a Hub Properties "request update" frame for `property`.
pub fn property_request(property: HubProperty) -> Result<Vec<u8>, ProtocolError> {
    encode(
        MessageType::HubProperties,
        &[property as u8, PROPERTY_OP_REQUEST_UPDATE],
    )
}

/// Builds the Hub Actions frame that powers the hub off.
pub fn hub_shutdown_request() -> Result<Vec<u8>, ProtocolError> {
    encode(MessageType::HubActions, &[HUB_ACTION_SWITCH_OFF])
}

// ── Tests ─────────────────────────────────────────────────────────────────────
