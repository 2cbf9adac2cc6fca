//! The byte link between the session and a hub.
//!
//! The session never talks to a Bluetooth stack directly.  It only needs to
//! open a link, write frames, receive notification frames and close the
//! link again, which is exactly what [`Transport`] describes.  Adapters live
//! in `infrastructure::transport`.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

/// Stream of raw notification frames.  The sender side is dropped when the
/// link goes away, which ends the stream.
pub type NotificationStream = mpsc::Receiver<Vec<u8>>;

/// Errors reported by a transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The link could not be established.
    #[error("failed to connect to {address}: {reason}")]
    ConnectFailed { address: String, reason: String },

    /// An operation needed an open link and there was none.
    #[error("transport is not connected")]
    NotConnected,

    /// A frame could not be written.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// Any other failure of the underlying stack (adapter missing, scan failed).
    #[error("bluetooth backend error: {0}")]
    Backend(String),
}

/// A hub found while scanning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredHub {
    pub address: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
}

/// Byte-in / byte-out link to one hub.
///
/// Implementations must be `Send` so that the session actor can own them
/// from inside a spawned task.
#[async_trait]
pub trait Transport: Send {
    /// Opens the link to `address`.
    async fn connect(&mut self, address: &str) -> Result<(), TransportError>;

    /// Subscribes to hub notifications.  Must be called after `connect`.
    async fn notifications(&mut self) -> Result<NotificationStream, TransportError>;

    /// Writes one complete frame.
    async fn write(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Closes the link.  Closing an already closed link is not an error.
    async fn disconnect(&mut self) -> Result<(), TransportError>;
}
