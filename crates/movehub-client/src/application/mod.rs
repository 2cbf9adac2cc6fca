//! Application layer use cases for the Move Hub client.
//!
//! - **`session`** – Owns one hub connection.  All writes and notifications
//!   pass through a single actor so commands keep their order, and the
//!   attached-device table and calibration state stay consistent with them.
//!
//! - **`control_loop`** – Turns a stream of operator input into rate-limited
//!   combined drive commands.
//!
//! - **`address`** – Picks the hub address from the command line or the
//!   saved config, and remembers the hub found by a scan.
//!
//! - **`transport`** – The link abstraction the session talks through.  The
//!   BLE and mock implementations live in `infrastructure::transport`.

pub mod address;
pub mod control_loop;
pub mod session;
pub mod transport;
