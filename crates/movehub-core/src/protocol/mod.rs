//! Protocol module containing message types, the frame codec and the GATT
//! identifiers used to reach the hub.

pub mod codec;
pub mod gatt;
pub mod messages;

pub use codec::{decode, encode, Message, ProtocolError};
pub use messages::*;
