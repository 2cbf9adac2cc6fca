//! movehub-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does movehub-client do?
//!
//! It drives a LEGO Technic Move Hub over Bluetooth LE:
//!
//! 1. Scans for hubs advertising the LEGO manufacturer id and remembers the
//!    one it finds.
//! 2. Opens a session: connects, subscribes to notifications and tracks the
//!    devices the hub reports on its ports.
//! 3. Calibrates the steering so combined drive/steer/lights commands are
//!    accepted.
//! 4. Runs the control loop, which turns keyboard (or scripted) input into
//!    at most one combined command per tick.
//!
//! The protocol and all pure logic live in `movehub-core`; this crate adds
//! the async session, the adapters and the `movehub` binary.

/// Application layer: session, control loop and the ports they depend on.
pub mod application;

/// Infrastructure layer: BLE and mock transports, input sources, config file.
pub mod infrastructure;
