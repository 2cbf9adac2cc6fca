//! Bluetooth identifiers for LEGO Wireless Protocol hubs.
//!
//! Every Powered Up hub exposes one GATT service with one characteristic.
//! Commands are written to that characteristic and the hub pushes
//! notifications back on it, so a transport only needs these three values.

use uuid::Uuid;

/// Company identifier of the LEGO System A/S in advertisement manufacturer data.
pub const LEGO_MANUFACTURER_ID: u16 = 0x0397;

/// LEGO Hub service: `00001623-1212-efde-1623-785feabcd123`.
pub const HUB_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1623_1212_efde_1623_785f_eabc_d123);

/// LEGO Hub characteristic: `00001624-1212-efde-1623-785feabcd123`.
pub const HUB_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_1624_1212_efde_1623_785f_eabc_d123);
