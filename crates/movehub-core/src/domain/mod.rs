//! Pure Move Hub logic with no I/O.
//!
//! Nothing in here touches Bluetooth, clocks or terminals.  The session and
//! control loop in `movehub-client` own those concerns and call into these
//! modules to decide what to send.

/// Device type ids, capabilities and the hub's port map.
pub mod devices;

/// Direct, combined and calibration Port Output Commands.
pub mod motor;

/// Steering calibration transitions.
pub mod calibration;

/// Operator input events and mapping rules.
pub mod control;
