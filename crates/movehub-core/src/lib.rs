//! # movehub-core
//!
//! Shared library for controlling a LEGO Technic Move Hub.  It contains the
//! wire protocol codec, the typed notification parsers, the device registry,
//! the motor command builder, the steering calibration state machine and the
//! input mapping rules used by the control loop.
//!
//! It has zero dependencies on BLE stacks, async runtimes or terminal APIs.
//!
//! # Architecture overview
//!
//! The Move Hub is a Bluetooth Low Energy peripheral that speaks the LEGO
//! Wireless Protocol 3.0: every message is a short frame written to (or
//! notified from) a single GATT characteristic.
//!
//! - **`protocol`** – How bytes travel over the link.  Frames are
//!   `[length][hub id][message type][payload]`, and notifications such as
//!   *Hub Attached IO* or *Port Output Command Feedback* are parsed into typed
//!   Rust values.
//!
//! - **`domain`** – Pure hub logic with no I/O.  Which device type ids are
//!   motors or lights, how a drive/steer/lights command is laid out on the
//!   combined virtual port, which calibration transitions are legal, and how
//!   operator input maps onto drive state.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `movehub_core::MotorCommand` instead of `movehub_core::domain::motor::MotorCommand`.
pub use domain::calibration::{
    CalibrationAction, CalibrationError, CalibrationEvent, CalibrationMachine, CalibrationState,
};
pub use domain::control::{ControlInputState, InputEvent, InputMapper, MapOutcome, MappingConfig};
pub use domain::devices::{classify, AttachedDevice, DeviceCapability};
pub use domain::motor::{
    build_calibration_end, build_calibration_start, build_combined, build_direct, CommandError,
    MotorCommand,
};
pub use protocol::codec::{decode, encode, Message, ProtocolError};
pub use protocol::messages::{MessageType, Notification};
