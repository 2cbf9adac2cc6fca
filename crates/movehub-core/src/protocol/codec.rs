//! Frame codec for LEGO Wireless Protocol messages.
//!
//! Wire format:
//! ```text
//! [length:1][hub_id:1][msg_type:1][payload:N]
//! ```
//! `length` counts the whole frame, header included.  The hub id is always
//! `0x00` for a directly connected hub.
//!
//! The protocol switches to a two-byte length once a frame reaches 128 bytes.
//! Nothing the Move Hub exchanges comes close to that, so the codec only
//! implements the single-byte form and rejects anything larger instead of
//! truncating it.

use thiserror::Error;

use crate::protocol::messages::{MessageType, HEADER_SIZE, HUB_ID, MAX_MESSAGE_LEN};

/// Errors that can occur while encoding or decoding a frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame would not fit in the single-byte length field.
    #[error("payload too large: frame would be {size} bytes, limit is 127")]
    PayloadTooLarge { size: usize },

    /// The bytes do not form a valid frame (too short, bad length, bad payload).
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

/// One decoded frame.
///
/// The payload is kept raw; [`crate::protocol::messages::Notification::parse`]
/// turns it into a typed value when the message type is one the session cares
/// about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Total serialized size, header included.
    pub length: u8,
    /// Hub id; always [`HUB_ID`].
    pub hub_id: u8,
    /// Message type, or [`MessageType::Unknown`] for codes this crate does not name.
    pub message_type: MessageType,
    /// Everything after the 3-byte header.
    pub payload: Vec<u8>,
}

impl Message {
    /// Builds a message, computing the length field.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PayloadTooLarge`] if the frame would be 128
    /// bytes or more.
    pub fn new(message_type: MessageType, payload: Vec<u8>) -> Result<Self, ProtocolError> {
        let size = HEADER_SIZE + payload.len();
        if size > MAX_MESSAGE_LEN {
            return Err(ProtocolError::PayloadTooLarge { size });
        }
        Ok(Self {
            length: size as u8,
            hub_id: HUB_ID,
            message_type,
            payload,
        })
    }

    /// Serializes the message to its wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.length as usize);
        buf.push(self.length);
        buf.push(self.hub_id);
        buf.push(self.message_type.code());
        buf.extend_from_slice(&self.payload);
        buf
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a message of `message_type` carrying `payload`.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] if `3 + payload.len() >= 128`.
///
/// # Examples
///
/// ```rust
/// use movehub_core::protocol::{decode, encode, MessageType};
///
/// let bytes = encode(MessageType::HubActions, &[0x01]).unwrap();
/// assert_eq!(bytes, vec![0x04, 0x00, 0x02, 0x01]);
///
/// let msg = decode(&bytes).unwrap();
/// assert_eq!(msg.message_type, MessageType::HubActions);
/// assert_eq!(msg.payload, vec![0x01]);
/// ```
pub fn encode(message_type: MessageType, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    Message::new(message_type, payload.to_vec()).map(|m| m.to_bytes())
}

/// Decodes exactly one frame from `bytes`.
///
/// An unrecognized type byte is not an error: it decodes to
/// [`MessageType::Unknown`] so that the caller can log and skip it.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedMessage`] if the buffer is shorter than
/// the header or if the declared length differs from the buffer length.
pub fn decode(bytes: &[u8]) -> Result<Message, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::MalformedMessage(format!(
            "need at least {HEADER_SIZE} bytes, got {}",
            bytes.len()
        )));
    }

    let declared = bytes[0] as usize;
    if declared != bytes.len() {
        return Err(ProtocolError::MalformedMessage(format!(
            "length byte says {declared}, buffer holds {}",
            bytes.len()
        )));
    }

    Ok(Message {
        length: bytes[0],
        hub_id: bytes[1],
        message_type: MessageType::from_code(bytes[2]),
        payload: bytes[HEADER_SIZE..].to_vec(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
