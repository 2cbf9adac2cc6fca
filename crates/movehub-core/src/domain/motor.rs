//! Port Output Command construction.
//!
//! The Move Hub accepts two shapes of motor command, both sent as
//! *WriteDirectModeData* (sub-command `0x51`):
//!
//! ```text
//! direct   : 08 00 81 <port> 11 51 00 <power>
//! combined : 0d 00 81 36 11 51 00 03 00 <speed> <steer> <lights> 00
//! ```
//!
//! The combined form drives the virtual port `0x36` and only steers
//! correctly once the hub has calibrated its steering, so building one
//! requires the caller to prove that calibration is [`CalibrationState::Done`].
//! Calibration itself uses the combined layout with a sentinel in the lights
//! slot: `0x10` asks the hub to find the end-stops, `0x08` to re-center.

use thiserror::Error;

use crate::domain::calibration::CalibrationState;
use crate::domain::devices::ports;
use crate::protocol::codec::{decode, encode, ProtocolError};
use crate::protocol::messages::MessageType;

// ── Wire constants ────────────────────────────────────────────────────────────

/// Startup/completion flags: execute immediately, request command feedback.
pub const OUTPUT_FLAGS: u8 = 0x11;

/// WriteDirectModeData sub-command.
pub const SUBCMD_WRITE_DIRECT_MODE_DATA: u8 = 0x51;

/// Mode byte of the combined drive/steer/lights record.
pub const COMBINED_MODE: u8 = 0x03;

/// Lights-slot sentinel that starts the end-stop search.
pub const CALIBRATION_FIND_ENDSTOPS: u8 = 0x10;

/// Lights-slot sentinel that moves the steering to center.
pub const CALIBRATION_CENTER: u8 = 0x08;

/// Direct power value that holds position.
pub const POWER_HOLD: i32 = 126;

/// Direct power value that brakes.
pub const POWER_BRAKE: i32 = 127;

/// Direct power value that lets the motor coast.
pub const POWER_COAST: i32 = 0;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Reasons a command could not be built.  All of them are detected before
/// any byte reaches the transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Direct power outside `-100..=100`, `126` and `127`.
    #[error("invalid power {0}: expected -100..=100, 126 (hold) or 127 (brake)")]
    InvalidPower(i32),

    /// A combined-command field is outside its range.
    #[error("{field} {value} out of range {min}..={max}")]
    InvalidRange {
        field: &'static str,
        value: i32,
        min: i32,
        max: i32,
    },

    /// A combined command was requested before steering calibration finished.
    #[error("steering is not calibrated")]
    UncalibratedSteering,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

// ── Command ───────────────────────────────────────────────────────────────────

/// A validated motor command.
///
/// Values of this type are only produced by the `build_*` functions, so
/// every field is already in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotorCommand {
    Direct { port: u8, power: i8 },
    Combined { speed: i8, steer: i8, lights: u8 },
    CalibrationStart,
    CalibrationEnd,
}

/// Builds a direct single-port command.
///
/// # Errors
///
/// [`CommandError::InvalidPower`] for anything other than `-100..=100`,
/// [`POWER_HOLD`] or [`POWER_BRAKE`].
pub fn build_direct(port: u8, power: i32) -> Result<MotorCommand, CommandError> {
    let valid = (-100..=100).contains(&power) || power == POWER_HOLD || power == POWER_BRAKE;
    if !valid {
        return Err(CommandError::InvalidPower(power));
    }
    Ok(MotorCommand::Direct {
        port,
        power: power as i8,
    })
}

fn check_range(field: &'static str, value: i32, min: i32, max: i32) -> Result<(), CommandError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(CommandError::InvalidRange {
            field,
            value,
            min,
            max,
        })
    }
}

/// Builds a combined drive/steer/lights command for port `0x36`.
///
/// # Errors
///
/// [`CommandError::InvalidRange`] if `speed` or `steer` is outside
/// `-100..=100` or `lights` outside `0..=100`;
/// [`CommandError::UncalibratedSteering`] unless `calibration` is `Done`.
pub fn build_combined(
    speed: i32,
    steer: i32,
    lights: i32,
    calibration: CalibrationState,
) -> Result<MotorCommand, CommandError> {
    check_range("speed", speed, -100, 100)?;
    check_range("steer", steer, -100, 100)?;
    check_range("lights", lights, 0, 100)?;
    if calibration != CalibrationState::Done {
        return Err(CommandError::UncalibratedSteering);
    }
    Ok(MotorCommand::Combined {
        speed: speed as i8,
        steer: steer as i8,
        lights: lights as u8,
    })
}

pub fn build_calibration_start() -> MotorCommand {
    MotorCommand::CalibrationStart
}

pub fn build_calibration_end() -> MotorCommand {
    MotorCommand::CalibrationEnd
}

fn combined_payload(speed: u8, steer: u8, lights: u8) -> [u8; 10] {
    [
        ports::COMBINED,
        OUTPUT_FLAGS,
        SUBCMD_WRITE_DIRECT_MODE_DATA,
        0x00,
        COMBINED_MODE,
        0x00,
        speed,
        steer,
        lights,
        0x00,
    ]
}

impl MotorCommand {
    /// Port the hub will report feedback for.
    pub fn target_port(&self) -> u8 {
        match self {
            MotorCommand::Direct { port, .. } => *port,
            _ => ports::COMBINED,
        }
    }

    /// Serializes the command into a complete frame.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        match *self {
            MotorCommand::Direct { port, power } => encode(
                MessageType::PortOutputCommand,
                &[
                    port,
                    OUTPUT_FLAGS,
                    SUBCMD_WRITE_DIRECT_MODE_DATA,
                    0x00,
                    power as u8,
                ],
            ),
            MotorCommand::Combined {
                speed,
                steer,
                lights,
            } => encode(
                MessageType::PortOutputCommand,
                &combined_payload(speed as u8, steer as u8, lights),
            ),
            MotorCommand::CalibrationStart => encode(
                MessageType::PortOutputCommand,
                &combined_payload(0, 0, CALIBRATION_FIND_ENDSTOPS),
            ),
            MotorCommand::CalibrationEnd => encode(
                MessageType::PortOutputCommand,
                &combined_payload(0, 0, CALIBRATION_CENTER),
            ),
        }
    }
}

/// Recovers `(speed, steer, lights)` from a combined command frame.
///
/// # Errors
///
/// [`ProtocolError::MalformedMessage`] if the frame is not a combined
/// Port Output Command for port `0x36`.
pub fn parse_combined(frame: &[u8]) -> Result<(i8, i8, u8), ProtocolError> {
    let msg = decode(frame)?;
    let p = msg.payload.as_slice();
    let is_combined = msg.message_type == MessageType::PortOutputCommand
        && p.len() == 10
        && p[0] == ports::COMBINED
        && p[2] == SUBCMD_WRITE_DIRECT_MODE_DATA
        && p[4] == COMBINED_MODE;
    if !is_combined {
        return Err(ProtocolError::MalformedMessage(
            "not a combined port output command".to_string(),
        ));
    }
    Ok((p[6] as i8, p[7] as i8, p[8]))
}
