//! In-memory transport for tests.
//!
//! [`MockTransport`] is handed to the session; the paired [`MockLink`] stays
//! with the test.  Through the link the test can:
//!
//! - inspect every frame the session wrote, in order;
//! - push notification frames as if the hub had sent them;
//! - install a responder that answers writes automatically (for example
//!   with command feedback);
//! - make `connect` or `write` fail, or drop the link entirely.
//!
//! ```ignore
//! let (transport, link) = MockTransport::new();
//! let hub = HubSession::connect(transport, "AA:BB", SessionConfig::default()).await?;
//!
//! link.notify(vec![0x0F, 0x00, 0x04, 0x00, 0x01, 0x01, 0x00, 0, 0, 0, 0, 0, 0, 0, 0]).await;
//! assert_eq!(link.writes().len(), 5);
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{NotificationStream, Transport, TransportError};

/// Computes notification frames to inject in reply to a written frame.
pub type Responder = Box<dyn Fn(&[u8]) -> Vec<Vec<u8>> + Send>;

#[derive(Default)]
struct LinkState {
    writes: Mutex<Vec<Vec<u8>>>,
    notify_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    responder: Mutex<Option<Responder>>,
    connected_to: Mutex<Option<String>>,
    fail_connect: AtomicBool,
    fail_writes: AtomicBool,
    disconnects: AtomicUsize,
}

/// Test-side handle onto a [`MockTransport`].
#[derive(Clone, Default)]
pub struct MockLink {
    state: Arc<LinkState>,
}

/// Session-side half of the in-memory link.
pub struct MockTransport {
    state: Arc<LinkState>,
    pending_rx: Option<mpsc::Receiver<Vec<u8>>>,
}

impl MockTransport {
    /// Creates a transport and the link handle that controls it.
    pub fn new() -> (Self, MockLink) {
        let link = MockLink::default();
        let transport = Self {
            state: Arc::clone(&link.state),
            pending_rx: None,
        };
        (transport, link)
    }
}

impl MockLink {
    /// Every frame written so far.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.writes.lock().unwrap().clone()
    }

    /// Written frames whose message type byte is `message_type`.
    pub fn writes_of_type(&self, message_type: u8) -> Vec<Vec<u8>> {
        self.writes()
            .into_iter()
            .filter(|f| f.get(2) == Some(&message_type))
            .collect()
    }

    pub fn clear_writes(&self) {
        self.state.writes.lock().unwrap().clear();
    }

    /// Address passed to the last successful `connect`.
    pub fn connected_to(&self) -> Option<String> {
        self.state.connected_to.lock().unwrap().clone()
    }

    pub fn disconnect_count(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Installs a function that answers each successful write.
    pub fn set_responder(&self, responder: impl Fn(&[u8]) -> Vec<Vec<u8>> + Send + 'static) {
        *self.state.responder.lock().unwrap() = Some(Box::new(responder));
    }

    /// Delivers a notification frame.  Returns `false` if the link is down.
    pub async fn notify(&self, frame: Vec<u8>) -> bool {
        let tx = self.state.notify_tx.lock().unwrap().clone();
        match tx {
            Some(tx) => tx.send(frame).await.is_ok(),
            None => false,
        }
    }

    /// Simulates the hub going away: the notification stream ends.
    pub fn drop_link(&self) {
        self.state.notify_tx.lock().unwrap().take();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self, address: &str) -> Result<(), TransportError> {
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed {
                address: address.to_string(),
                reason: "mock failure".into(),
            });
        }
        let (tx, rx) = mpsc::channel(256);
        *self.state.notify_tx.lock().unwrap() = Some(tx);
        *self.state.connected_to.lock().unwrap() = Some(address.to_string());
        self.pending_rx = Some(rx);
        Ok(())
    }

    async fn notifications(&mut self) -> Result<NotificationStream, TransportError> {
        self.pending_rx.take().ok_or(TransportError::NotConnected)
    }

    async fn write(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::WriteFailed("mock failure".into()));
        }
        let tx = self
            .state
            .notify_tx
            .lock()
            .unwrap()
            .clone()
            .ok_or(TransportError::NotConnected)?;
        self.state.writes.lock().unwrap().push(frame.to_vec());

        let replies = match self.state.responder.lock().unwrap().as_ref() {
            Some(responder) => responder(frame),
            None => Vec::new(),
        };
        for reply in replies {
            // The session is busy with this write, so never block on it here.
            let _ = tx.try_send(reply);
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.state.notify_tx.lock().unwrap().take();
        self.state.connected_to.lock().unwrap().take();
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_then_write_is_recorded() {
        // Arrange
        let (mut transport, link) = MockTransport::new();

        // Act
        transport.connect("AA:BB").await.unwrap();
        transport.write(&[0x04, 0x00, 0x02, 0x01]).await.unwrap();

        // Assert
        assert_eq!(link.connected_to().as_deref(), Some("AA:BB"));
        assert_eq!(link.writes(), vec![vec![0x04, 0x00, 0x02, 0x01]]);
    }

    #[tokio::test]
    async fn test_write_before_connect_fails() {
        let (mut transport, _link) = MockTransport::new();
        assert_eq!(
            transport.write(&[0x03, 0x00, 0x01]).await,
            Err(TransportError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_fail_connect_flag() {
        let (mut transport, link) = MockTransport::new();
        link.set_fail_connect(true);
        assert!(matches!(
            transport.connect("AA:BB").await,
            Err(TransportError::ConnectFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_responder_replies_arrive_on_stream() {
        let (mut transport, link) = MockTransport::new();
        transport.connect("AA:BB").await.unwrap();
        let mut stream = transport.notifications().await.unwrap();
        link.set_responder(|frame| vec![vec![0x05, 0x00, 0x82, frame[3], 0x0A]]);

        transport
            .write(&[0x08, 0x00, 0x81, 0x32, 0x11, 0x51, 0x00, 0x00])
            .await
            .unwrap();

        assert_eq!(stream.recv().await, Some(vec![0x05, 0x00, 0x82, 0x32, 0x0A]));
    }

    #[tokio::test]
    async fn test_drop_link_ends_stream() {
        let (mut transport, link) = MockTransport::new();
        transport.connect("AA:BB").await.unwrap();
        let mut stream = transport.notifications().await.unwrap();

        link.drop_link();

        assert_eq!(stream.recv().await, None);
    }
}
