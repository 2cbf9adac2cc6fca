//! Infrastructure layer: adapters to the outside world.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `movehub_core`, but MUST NOT be imported by the `application` layer.
//! Adapters implement traits that the application layer defines.
//!
//! # Sub-modules
//!
//! - **`transport`** – btleplug BLE implementation of `Transport` (feature
//!   `ble`) and an in-memory mock.
//! - **`input`** – raw-terminal keyboard reader and a scripted source for
//!   tests, both implementing `InputSource`.
//! - **`storage`** – TOML config file and the file-backed `AddressStore`
//!   used to remember the last hub.

pub mod input;
pub mod storage;
pub mod transport;
