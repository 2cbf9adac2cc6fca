//! Transport adapters.
//!
//! - **`ble`** (feature `ble`) – btleplug-backed GATT client that writes to
//!   the LEGO hub characteristic and subscribes to its notifications.
//! - **`mock`** – in-memory link used by tests.  It records every write and
//!   lets the test inject notifications or simulate link failures.

#[cfg(feature = "ble")]
pub mod ble;
pub mod mock;

pub use crate::application::transport::{
    DiscoveredHub, NotificationStream, Transport, TransportError,
};
