//! Bluetooth LE transport backed by `btleplug`.
//!
//! The hub exposes a single characteristic on the LEGO Hub service.  Frames
//! are written to it without response and notifications arrive on the same
//! characteristic.  btleplug hands notifications out as a `Stream`; a small
//! forwarding task turns that into the [`NotificationStream`] channel the
//! session expects.  The same task watches adapter events and closes the
//! channel when the hub drops the link, since the notification stream does
//! not end on every platform.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use movehub_core::protocol::gatt::{HUB_CHARACTERISTIC_UUID, HUB_SERVICE_UUID, LEGO_MANUFACTURER_ID};

use super::{DiscoveredHub, NotificationStream, Transport, TransportError};

fn backend(e: btleplug::Error) -> TransportError {
    TransportError::Backend(e.to_string())
}

async fn first_adapter() -> Result<Adapter, TransportError> {
    let manager = Manager::new().await.map_err(backend)?;
    manager
        .adapters()
        .await
        .map_err(backend)?
        .into_iter()
        .next()
        .ok_or_else(|| TransportError::Backend("no bluetooth adapter found".into()))
}

/// Identifier used to address a peripheral.  On Linux and Windows this is
/// the MAC address; macOS hides MACs, so the CoreBluetooth UUID is used there.
fn peripheral_address(peripheral: &Peripheral) -> String {
    #[cfg(target_os = "macos")]
    {
        peripheral.id().to_string()
    }
    #[cfg(not(target_os = "macos"))]
    {
        peripheral.address().to_string()
    }
}

/// Scans for `duration` and returns every peripheral advertising LEGO
/// manufacturer data.
pub async fn scan(duration: Duration) -> Result<Vec<DiscoveredHub>, TransportError> {
    let adapter = first_adapter().await?;
    info!(?duration, "scanning for LEGO hubs");
    adapter.start_scan(ScanFilter::default()).await.map_err(backend)?;
    tokio::time::sleep(duration).await;
    let peripherals = adapter.peripherals().await.map_err(backend)?;
    if let Err(e) = adapter.stop_scan().await {
        warn!("stop_scan failed: {e}");
    }

    let mut hubs = Vec::new();
    for peripheral in peripherals {
        let Ok(Some(props)) = peripheral.properties().await else {
            continue;
        };
        if !props.manufacturer_data.contains_key(&LEGO_MANUFACTURER_ID) {
            continue;
        }
        let hub = DiscoveredHub {
            address: peripheral_address(&peripheral),
            name: props.local_name,
            rssi: props.rssi,
        };
        debug!(?hub, "found hub");
        hubs.push(hub);
    }
    Ok(hubs)
}

struct Link {
    adapter: Adapter,
    peripheral: Peripheral,
    characteristic: Characteristic,
}

/// GATT link to one hub.
#[derive(Default)]
pub struct BleTransport {
    scan_timeout: Duration,
    link: Option<Link>,
    forwarder: Option<JoinHandle<()>>,
}

impl BleTransport {
    /// `scan_timeout` bounds how long `connect` looks for the address.
    pub fn new(scan_timeout: Duration) -> Self {
        Self {
            scan_timeout,
            ..Self::default()
        }
    }

    async fn find(&self, adapter: &Adapter, address: &str) -> Result<Option<Peripheral>, TransportError> {
        for peripheral in adapter.peripherals().await.map_err(backend)? {
            if peripheral_address(&peripheral).eq_ignore_ascii_case(address) {
                return Ok(Some(peripheral));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn connect(&mut self, address: &str) -> Result<(), TransportError> {
        let fail = |reason: String| TransportError::ConnectFailed {
            address: address.to_string(),
            reason,
        };

        let adapter = first_adapter().await?;
        adapter
            .start_scan(ScanFilter {
                services: vec![HUB_SERVICE_UUID],
            })
            .await
            .map_err(backend)?;

        let deadline = tokio::time::Instant::now() + self.scan_timeout;
        let peripheral = loop {
            if let Some(p) = self.find(&adapter, address).await? {
                break p;
            }
            if tokio::time::Instant::now() >= deadline {
                let _ = adapter.stop_scan().await;
                return Err(fail("hub not found".into()));
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        };
        let _ = adapter.stop_scan().await;

        peripheral.connect().await.map_err(|e| fail(e.to_string()))?;
        peripheral
            .discover_services()
            .await
            .map_err(|e| fail(e.to_string()))?;
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == HUB_CHARACTERISTIC_UUID)
            .ok_or_else(|| fail("hub characteristic missing".into()))?;

        info!(%address, "connected");
        self.link = Some(Link {
            adapter,
            peripheral,
            characteristic,
        });
        Ok(())
    }

    async fn notifications(&mut self) -> Result<NotificationStream, TransportError> {
        let link = self.link.as_ref().ok_or(TransportError::NotConnected)?;
        link.peripheral
            .subscribe(&link.characteristic)
            .await
            .map_err(backend)?;
        let mut stream = link.peripheral.notifications().await.map_err(backend)?;
        let mut central_events = link.adapter.events().await.map_err(backend)?;

        let (tx, rx) = mpsc::channel(256);
        let uuid = link.characteristic.uuid;
        let id = link.peripheral.id();
        self.forwarder = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    notification = stream.next() => match notification {
                        Some(n) if n.uuid == uuid => {
                            if tx.send(n.value).await.is_err() {
                                break;
                            }
                        }
                        Some(_) => {}
                        None => break,
                    },
                    event = central_events.next() => match event {
                        Some(CentralEvent::DeviceDisconnected(gone)) if gone == id => {
                            warn!("hub dropped the link");
                            break;
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
            debug!("notification stream ended");
        }));
        Ok(rx)
    }

    async fn write(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let link = self.link.as_ref().ok_or(TransportError::NotConnected)?;
        link.peripheral
            .write(&link.characteristic, frame, WriteType::WithoutResponse)
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if let Some(task) = self.forwarder.take() {
            task.abort();
        }
        if let Some(link) = self.link.take() {
            link.peripheral.disconnect().await.map_err(backend)?;
            info!("disconnected");
        }
        Ok(())
    }
}
