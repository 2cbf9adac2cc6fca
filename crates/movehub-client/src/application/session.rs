//! Hub session: one connection, one actor, one ordered queue.
//!
//! # Architecture
//!
//! ```text
//!  HubHandle ──┐                      ┌──────────────── SessionActor ───────────────┐
//!  HubHandle ──┼──► mpsc<Request> ──► │ HubState · CalibrationMachine · Transport   │
//!  pump task ──┘   (notifications)    │ select! { request, calibration deadline }    │
//!                                     └──────────────┬──────────────────────────────┘
//!                                                    └──► broadcast<SessionEvent>
//! ```
//!
//! Every outgoing write and every incoming notification passes through the
//! actor's single queue, so commands are written in the order they were
//! requested and state updates never race with them.  The pump task only
//! forwards notification frames into that queue.
//!
//! The calibration wait is a deadline inside the actor's `select!`, not a
//! sleeping task, so cancel and disconnect requests are handled while the
//! hub is still searching for its end-stops.
//!
//! Handles are cheap to clone.  When the last handle is dropped the actor
//! closes the link and stops.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use movehub_core::domain::devices::ports;
use movehub_core::domain::motor::{POWER_BRAKE, POWER_COAST};
use movehub_core::protocol::messages::{
    hub_shutdown_request, property_request, AttachedIoEvent, GenericErrorReport, HubProperty,
    PortFeedback, PortValue, PropertyValue,
};
use movehub_core::{
    build_calibration_end, build_calibration_start, build_combined, build_direct, decode,
    AttachedDevice, CalibrationAction, CalibrationError, CalibrationEvent, CalibrationMachine,
    CalibrationState, CommandError, MotorCommand, Notification, ProtocolError,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::application::transport::{NotificationStream, Transport, TransportError};

const REQUEST_QUEUE_DEPTH: usize = 128;
const EVENT_BUFFER: usize = 256;
/// Pause between property requests; the hub drops requests sent back to back.
const PROPERTY_QUERY_GAP: Duration = Duration::from_millis(50);

// ── Configuration ─────────────────────────────────────────────────────────────

/// Session timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long the hub gets to find both steering end-stops.
    pub calibration_wait: Duration,
    /// How long to wait for centering feedback before assuming it finished.
    pub centering_grace: Duration,
    /// Bound on `send_with_feedback`.
    pub feedback_timeout: Duration,
    /// Pause after connecting so attached-IO notifications can arrive.
    pub attach_settle: Duration,
    /// Query name, versions, battery and manufacturer on connect.
    pub query_properties: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            calibration_wait: Duration::from_millis(2000),
            centering_grace: Duration::from_millis(500),
            feedback_timeout: Duration::from_millis(1000),
            attach_settle: Duration::from_millis(300),
            query_properties: true,
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The transport could not open the link.  Not retried.
    #[error("connection failed: {0}")]
    ConnectionError(#[source] TransportError),

    /// The transport rejected a write.  Not retried.
    #[error("command write failed: {0}")]
    CommandWriteFailed(#[source] TransportError),

    /// No Port Output Command Feedback for `port` within `timeout`.
    #[error("no feedback for port {port} within {timeout:?}")]
    CommandTimeout { port: u8, timeout: Duration },

    #[error("steering calibration already in progress")]
    CalibrationInProgress,

    #[error("steering calibration was cancelled")]
    CalibrationCancelled,

    /// The session has been disconnected (or its actor is gone).
    #[error("not connected to a hub")]
    NotConnected,

    #[error(transparent)]
    Command(#[from] CommandError),
}

impl From<CalibrationError> for SessionError {
    fn from(e: CalibrationError) -> Self {
        match e {
            CalibrationError::CalibrationInProgress => SessionError::CalibrationInProgress,
        }
    }
}

impl From<ProtocolError> for SessionError {
    fn from(e: ProtocolError) -> Self {
        SessionError::Command(CommandError::Protocol(e))
    }
}

// ── Events and status ─────────────────────────────────────────────────────────

/// Things observers may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    DeviceAttached(AttachedDevice),
    DeviceDetached { port: u8 },
    PropertyUpdated(PropertyValue),
    /// The hub reported a Generic Error for one of our commands.
    HubError(GenericErrorReport),
    PortValue { port: u8, raw: Vec<u8> },
    Calibration(CalibrationState),
    Disconnected,
}

/// Snapshot of everything the session knows about the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HubStatus {
    pub connected: bool,
    pub address: String,
    pub name: Option<String>,
    pub firmware_version: Option<String>,
    pub hardware_version: Option<String>,
    pub manufacturer: Option<String>,
    pub battery_level: Option<u8>,
    pub calibration: CalibrationState,
    pub steering_position: Option<i32>,
    /// Attached devices ordered by port.
    pub devices: Vec<AttachedDevice>,
    /// Last raw value reported per port.
    pub port_values: BTreeMap<u8, Vec<u8>>,
}

/// Hub-side state rebuilt from notifications.
#[derive(Debug, Clone, Default)]
pub struct HubState {
    pub devices: BTreeMap<u8, AttachedDevice>,
    pub name: Option<String>,
    pub firmware_version: Option<String>,
    pub hardware_version: Option<String>,
    pub manufacturer: Option<String>,
    pub battery_level: Option<u8>,
    pub port_values: HashMap<u8, PortValue>,
}

impl HubState {
    /// Applies a notification and returns the event to publish, if any.
    pub fn apply(&mut self, notification: &Notification) -> Option<SessionEvent> {
        match notification {
            Notification::AttachedIo { port, event } => match *event {
                AttachedIoEvent::Attached { type_id } => {
                    let device = AttachedDevice::new(*port, type_id);
                    debug!(port, name = %device.name(), capability = ?device.capability, "device attached");
                    self.devices.insert(*port, device.clone());
                    Some(SessionEvent::DeviceAttached(device))
                }
                AttachedIoEvent::AttachedVirtual {
                    type_id,
                    port_a,
                    port_b,
                } => {
                    let device = AttachedDevice::new_virtual(*port, type_id, port_a, port_b);
                    debug!(port, port_a, port_b, "virtual port attached");
                    self.devices.insert(*port, device.clone());
                    Some(SessionEvent::DeviceAttached(device))
                }
                AttachedIoEvent::Detached => match self.devices.remove(port) {
                    Some(_) => {
                        debug!(port, "device detached");
                        self.port_values.remove(port);
                        Some(SessionEvent::DeviceDetached { port: *port })
                    }
                    None => {
                        debug!(port, "detach for unknown port ignored");
                        None
                    }
                },
            },
            Notification::Property(value) => {
                match value {
                    PropertyValue::Name(v) => self.name = Some(v.clone()),
                    PropertyValue::FirmwareVersion(v) => self.firmware_version = Some(v.clone()),
                    PropertyValue::HardwareVersion(v) => self.hardware_version = Some(v.clone()),
                    PropertyValue::Manufacturer(v) => self.manufacturer = Some(v.clone()),
                    PropertyValue::BatteryLevel(v) => self.battery_level = Some(*v),
                }
                Some(SessionEvent::PropertyUpdated(value.clone()))
            }
            Notification::GenericError(report) => {
                warn!(command = ?report.command_type, code = ?report.code, "hub reported an error");
                Some(SessionEvent::HubError(*report))
            }
            Notification::PortValue(value) => {
                self.port_values.insert(value.port, value.clone());
                Some(SessionEvent::PortValue {
                    port: value.port,
                    raw: value.raw.clone(),
                })
            }
            Notification::CommandFeedback(_) | Notification::Unsupported(_) => None,
        }
    }

    /// Steering encoder position from the last Port Value of port 52.
    pub fn steering_position(&self) -> Option<i32> {
        self.port_values
            .get(&ports::STEERING)
            .and_then(PortValue::as_i32)
    }

    /// Forgets everything tied to the live connection.
    pub fn clear_connection_state(&mut self) {
        self.devices.clear();
        self.port_values.clear();
    }
}

// ── Requests ──────────────────────────────────────────────────────────────────

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;
type CalibrationResult = Result<(), SessionError>;

enum Request {
    Command {
        command: MotorCommand,
        feedback: Option<oneshot::Sender<()>>,
        reply: Reply<()>,
    },
    Drive {
        speed: i32,
        steer: i32,
        lights: i32,
        reply: Reply<()>,
    },
    Stop {
        reply: Reply<()>,
    },
    Brake {
        reply: Reply<()>,
    },
    ReleaseBrake {
        reply: Reply<()>,
    },
    SetLights {
        level: i32,
        reply: Reply<()>,
    },
    Raw {
        frames: Vec<Vec<u8>>,
        reply: Reply<()>,
    },
    Calibrate {
        reply: Reply<oneshot::Receiver<CalibrationResult>>,
    },
    CancelCalibration {
        reply: Reply<()>,
    },
    Status {
        reply: oneshot::Sender<HubStatus>,
    },
    Disconnect {
        reply: Reply<()>,
    },
    Notification(Vec<u8>),
    NotificationsClosed,
}

impl Request {
    /// Answers a request that needs a live link with `error`.
    fn reject(self, error: SessionError) {
        match self {
            Request::Command { reply, .. }
            | Request::Drive { reply, .. }
            | Request::Stop { reply }
            | Request::Brake { reply }
            | Request::ReleaseBrake { reply }
            | Request::SetLights { reply, .. }
            | Request::Raw { reply, .. }
            | Request::CancelCalibration { reply }
            | Request::Disconnect { reply } => {
                let _ = reply.send(Err(error));
            }
            Request::Calibrate { reply } => {
                let _ = reply.send(Err(error));
            }
            Request::Status { .. } | Request::Notification(_) | Request::NotificationsClosed => {}
        }
    }
}

// ── Connect ───────────────────────────────────────────────────────────────────

/// Entry point for opening a session.
pub struct HubSession;

impl HubSession {
    /// Opens the link, starts the session actor, queries hub properties and
    /// waits for the attached-IO burst to settle.
    ///
    /// # Errors
    ///
    /// [`SessionError::ConnectionError`] if the transport cannot connect or
    /// subscribe.  There is no retry.
    pub async fn connect<T>(
        mut transport: T,
        address: &str,
        config: SessionConfig,
    ) -> Result<HubHandle, SessionError>
    where
        T: Transport + 'static,
    {
        info!(%address, "connecting to hub");
        transport
            .connect(address)
            .await
            .map_err(SessionError::ConnectionError)?;
        let stream = match transport.notifications().await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = transport.disconnect().await;
                return Err(SessionError::ConnectionError(e));
            }
        };

        let (requests, request_rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let pump = spawn_pump(stream, requests.downgrade());

        let actor = SessionActor::new(transport, address, config.clone(), events.clone(), Some(pump));
        tokio::spawn(actor.run(request_rx));

        let handle = HubHandle {
            requests,
            events,
            feedback_timeout: config.feedback_timeout,
        };
        if config.query_properties {
            handle.query_properties().await?;
        }
        if !config.attach_settle.is_zero() {
            tokio::time::sleep(config.attach_settle).await;
        }
        info!(%address, "hub session ready");
        Ok(handle)
    }
}

fn spawn_pump(mut stream: NotificationStream, requests: mpsc::WeakSender<Request>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = stream.recv().await {
            let Some(tx) = requests.upgrade() else {
                return;
            };
            if tx.send(Request::Notification(frame)).await.is_err() {
                return;
            }
        }
        if let Some(tx) = requests.upgrade() {
            let _ = tx.send(Request::NotificationsClosed).await;
        }
    })
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct HubHandle {
    requests: mpsc::Sender<Request>,
    events: broadcast::Sender<SessionEvent>,
    feedback_timeout: Duration,
}

/// Completion of a calibration started with [`HubHandle::start_calibration`].
pub struct CalibrationHandle {
    done: oneshot::Receiver<CalibrationResult>,
}

impl CalibrationHandle {
    /// Resolves once calibration is `Done`, or with the reason it stopped.
    pub async fn wait(self) -> Result<(), SessionError> {
        self.done.await.unwrap_or(Err(SessionError::NotConnected))
    }
}

impl HubHandle {
    async fn request<R>(&self, make: impl FnOnce(Reply<R>) -> Request) -> Result<R, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(make(tx))
            .await
            .map_err(|_| SessionError::NotConnected)?;
        rx.await.map_err(|_| SessionError::NotConnected)?
    }

    /// Writes a command without waiting for hub feedback.
    pub async fn send(&self, command: MotorCommand) -> Result<(), SessionError> {
        self.request(|reply| Request::Command {
            command,
            feedback: None,
            reply,
        })
        .await
    }

    /// Writes a command and waits for Port Output Command Feedback on its port.
    ///
    /// # Errors
    ///
    /// [`SessionError::CommandTimeout`] if no feedback arrives within the
    /// configured bound.
    pub async fn send_with_feedback(&self, command: MotorCommand) -> Result<(), SessionError> {
        let (feedback_tx, feedback_rx) = oneshot::channel();
        self.request(|reply| Request::Command {
            command,
            feedback: Some(feedback_tx),
            reply,
        })
        .await?;

        match tokio::time::timeout(self.feedback_timeout, feedback_rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SessionError::NotConnected),
            Err(_) => {
                let port = command.target_port();
                warn!(port, "command feedback timed out");
                Err(SessionError::CommandTimeout {
                    port,
                    timeout: self.feedback_timeout,
                })
            }
        }
    }

    /// [`send`](Self::send) or [`send_with_feedback`](Self::send_with_feedback).
    pub async fn send_command(&self, command: MotorCommand, feedback: bool) -> Result<(), SessionError> {
        if feedback {
            self.send_with_feedback(command).await
        } else {
            self.send(command).await
        }
    }

    /// Sends a combined drive/steer/lights command.  Requires calibrated steering.
    pub async fn drive(&self, speed: i32, steer: i32, lights: i32) -> Result<(), SessionError> {
        self.request(|reply| Request::Drive {
            speed,
            steer,
            lights,
            reply,
        })
        .await
    }

    /// Coasts the drive motors and centers the steering.
    pub async fn stop(&self) -> Result<(), SessionError> {
        self.request(|reply| Request::Stop { reply }).await
    }

    /// Brakes both drive motors.
    pub async fn brake(&self) -> Result<(), SessionError> {
        self.request(|reply| Request::Brake { reply }).await
    }

    pub async fn release_brake(&self) -> Result<(), SessionError> {
        self.request(|reply| Request::ReleaseBrake { reply }).await
    }

    /// Sets the lights, `0..=100`.
    pub async fn set_lights(&self, level: i32) -> Result<(), SessionError> {
        self.request(|reply| Request::SetLights { level, reply }).await
    }

    /// Switches the hub off.  The link drops shortly afterwards.
    pub async fn shutdown_hub(&self) -> Result<(), SessionError> {
        let frames = vec![hub_shutdown_request()?];
        self.request(|reply| Request::Raw { frames, reply }).await
    }

    /// Asks the hub to report name, versions, battery and manufacturer.
    ///
    /// Requests are spaced out; other requests may be served in between.
    pub async fn query_properties(&self) -> Result<(), SessionError> {
        for (i, property) in HubProperty::ALL.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(PROPERTY_QUERY_GAP).await;
            }
            let frames = vec![property_request(*property)?];
            self.request(|reply| Request::Raw { frames, reply }).await?;
        }
        Ok(())
    }

    /// Starts steering calibration and returns once the start frame is written.
    ///
    /// # Errors
    ///
    /// [`SessionError::CalibrationInProgress`] if one is already running.
    pub async fn start_calibration(&self) -> Result<CalibrationHandle, SessionError> {
        let done = self.request(|reply| Request::Calibrate { reply }).await?;
        Ok(CalibrationHandle { done })
    }

    /// Runs steering calibration to completion.
    pub async fn calibrate(&self) -> Result<(), SessionError> {
        self.start_calibration().await?.wait().await
    }

    /// Cancels a running calibration.  A no-op when none is running.
    pub async fn cancel_calibration(&self) -> Result<(), SessionError> {
        self.request(|reply| Request::CancelCalibration { reply }).await
    }

    pub async fn status(&self) -> Result<HubStatus, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(Request::Status { reply: tx })
            .await
            .map_err(|_| SessionError::NotConnected)?;
        rx.await.map_err(|_| SessionError::NotConnected)
    }

    pub async fn steering_position(&self) -> Result<Option<i32>, SessionError> {
        Ok(self.status().await?.steering_position)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Closes the link.  Later requests fail with `NotConnected`.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.request(|reply| Request::Disconnect { reply }).await
    }
}

// ── Actor ─────────────────────────────────────────────────────────────────────

struct SessionActor<T: Transport> {
    transport: T,
    address: String,
    config: SessionConfig,
    state: HubState,
    calibration: CalibrationMachine,
    calibration_deadline: Option<Instant>,
    calibration_waiters: Vec<oneshot::Sender<CalibrationResult>>,
    feedback_waiters: HashMap<u8, Vec<oneshot::Sender<()>>>,
    // Last combined values written, reused by stop and set_lights.
    speed: i8,
    steer: i8,
    lights: u8,
    connected: bool,
    events: broadcast::Sender<SessionEvent>,
    pump: Option<JoinHandle<()>>,
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl<T: Transport> SessionActor<T> {
    fn new(
        transport: T,
        address: &str,
        config: SessionConfig,
        events: broadcast::Sender<SessionEvent>,
        pump: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            transport,
            address: address.to_string(),
            config,
            state: HubState::default(),
            calibration: CalibrationMachine::new(),
            calibration_deadline: None,
            calibration_waiters: Vec::new(),
            feedback_waiters: HashMap::new(),
            speed: 0,
            steer: 0,
            lights: 0,
            connected: true,
            events,
            pump,
        }
    }

    async fn run(mut self, mut requests: mpsc::Receiver<Request>) {
        loop {
            let deadline = self.calibration_deadline;
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
                _ = deadline_elapsed(deadline) => self.on_calibration_deadline().await,
            }
        }

        if self.connected {
            if let Err(e) = self.transport.disconnect().await {
                warn!("disconnect on shutdown failed: {e}");
            }
            self.mark_disconnected();
        }
        debug!(address = %self.address, "session actor stopped");
    }

    async fn handle(&mut self, request: Request) {
        match request {
            Request::Notification(frame) => self.on_notification(&frame),
            Request::NotificationsClosed => {
                if self.connected {
                    warn!(address = %self.address, "notification stream closed, hub disconnected");
                    self.mark_disconnected();
                }
            }
            Request::Status { reply } => {
                let _ = reply.send(self.status());
            }
            other if !self.connected => other.reject(SessionError::NotConnected),
            Request::Command {
                command,
                feedback,
                reply,
            } => {
                let _ = reply.send(self.write_command(command, feedback).await);
            }
            Request::Drive {
                speed,
                steer,
                lights,
                reply,
            } => {
                let _ = reply.send(self.drive(speed, steer, lights).await);
            }
            Request::Stop { reply } => {
                let _ = reply.send(self.stop().await);
            }
            Request::Brake { reply } => {
                let _ = reply.send(self.write_drive_ports(POWER_BRAKE).await);
            }
            Request::ReleaseBrake { reply } => {
                let _ = reply.send(self.write_drive_ports(POWER_COAST).await);
            }
            Request::SetLights { level, reply } => {
                let _ = reply.send(self.set_lights(level).await);
            }
            Request::Raw { frames, reply } => {
                let _ = reply.send(self.write_frames(&frames).await);
            }
            Request::Calibrate { reply } => {
                let _ = reply.send(self.start_calibration().await);
            }
            Request::CancelCalibration { reply } => {
                let _ = reply.send(self.cancel_calibration().await);
            }
            Request::Disconnect { reply } => {
                if let Err(e) = self.transport.disconnect().await {
                    warn!("transport disconnect failed: {e}");
                }
                info!(address = %self.address, "disconnected");
                self.mark_disconnected();
                let _ = reply.send(Ok(()));
            }
        }
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    async fn write(&mut self, frame: &[u8]) -> Result<(), SessionError> {
        trace!(?frame, "tx");
        self.transport
            .write(frame)
            .await
            .map_err(SessionError::CommandWriteFailed)
    }

    async fn write_frames(&mut self, frames: &[Vec<u8>]) -> Result<(), SessionError> {
        for frame in frames {
            self.write(frame).await?;
        }
        Ok(())
    }

    async fn write_command(
        &mut self,
        command: MotorCommand,
        feedback: Option<oneshot::Sender<()>>,
    ) -> Result<(), SessionError> {
        let frame = command.encode()?;
        self.write(&frame).await?;
        // Feedback is handled on this same task, so registering after the
        // write cannot miss it.  A failed write leaves no waiter behind.
        if let Some(waiter) = feedback {
            let waiters = self.feedback_waiters.entry(command.target_port()).or_default();
            waiters.retain(|w| !w.is_closed());
            waiters.push(waiter);
        }
        Ok(())
    }

    async fn drive(&mut self, speed: i32, steer: i32, lights: i32) -> Result<(), SessionError> {
        let command = build_combined(speed, steer, lights, self.calibration.state())?;
        self.write_command(command, None).await?;
        if let MotorCommand::Combined {
            speed,
            steer,
            lights,
        } = command
        {
            self.speed = speed;
            self.steer = steer;
            self.lights = lights;
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SessionError> {
        if self.calibration.state() == CalibrationState::Done {
            return self.drive(0, 0, self.lights as i32).await;
        }
        for port in [ports::DRIVE_LEFT, ports::DRIVE_RIGHT, ports::STEERING] {
            self.write_command(build_direct(port, POWER_COAST)?, None).await?;
        }
        Ok(())
    }

    async fn write_drive_ports(&mut self, power: i32) -> Result<(), SessionError> {
        for port in [ports::DRIVE_LEFT, ports::DRIVE_RIGHT] {
            self.write_command(build_direct(port, power)?, None).await?;
        }
        if power == POWER_BRAKE {
            self.speed = 0;
        }
        Ok(())
    }

    async fn set_lights(&mut self, level: i32) -> Result<(), SessionError> {
        if !(0..=100).contains(&level) {
            return Err(CommandError::InvalidRange {
                field: "lights",
                value: level,
                min: 0,
                max: 100,
            }
            .into());
        }
        // The direct port works without calibration, the combined record
        // overrides it once steering is calibrated.
        self.write_command(build_direct(ports::LIGHTS, level)?, None).await?;
        self.lights = level as u8;
        if self.calibration.state() == CalibrationState::Done {
            return self.drive(self.speed as i32, self.steer as i32, level).await;
        }
        Ok(())
    }

    // ── Calibration ───────────────────────────────────────────────────────────

    async fn perform(&mut self, action: CalibrationAction) -> Result<(), SessionError> {
        let command = match action {
            CalibrationAction::None => return Ok(()),
            CalibrationAction::SendStart => build_calibration_start(),
            CalibrationAction::SendEnd => build_calibration_end(),
            CalibrationAction::SendStop => build_direct(ports::STEERING, POWER_COAST)?,
        };
        self.write_command(command, None).await
    }

    async fn start_calibration(&mut self) -> Result<oneshot::Receiver<CalibrationResult>, SessionError> {
        let action = self.calibration.handle(CalibrationEvent::Start)?;
        if let Err(e) = self.perform(action).await {
            self.calibration = CalibrationMachine::new();
            return Err(e);
        }
        info!("steering calibration started");
        self.speed = 0;
        self.steer = 0;
        self.calibration_deadline = Some(Instant::now() + self.config.calibration_wait);
        let (tx, rx) = oneshot::channel();
        self.calibration_waiters.push(tx);
        self.emit(SessionEvent::Calibration(CalibrationState::Calibrating));
        Ok(rx)
    }

    async fn on_calibration_deadline(&mut self) {
        self.calibration_deadline = None;
        match self.calibration.state() {
            CalibrationState::Calibrating => {
                let action = self
                    .calibration
                    .handle(CalibrationEvent::WaitElapsed)
                    .unwrap_or(CalibrationAction::None);
                match self.perform(action).await {
                    Ok(()) => {
                        debug!("end-stops found, centering");
                        self.calibration_deadline =
                            Some(Instant::now() + self.config.centering_grace);
                        self.emit(SessionEvent::Calibration(CalibrationState::Centering));
                    }
                    Err(e) => {
                        warn!("calibration aborted: {e}");
                        self.calibration = CalibrationMachine::new();
                        self.finish_calibration(Err(e));
                        self.emit(SessionEvent::Calibration(CalibrationState::Idle));
                    }
                }
            }
            CalibrationState::Centering => self.complete_centering(),
            CalibrationState::Idle | CalibrationState::Done => {}
        }
    }

    fn complete_centering(&mut self) {
        let _ = self.calibration.handle(CalibrationEvent::CenteringFinished);
        if self.calibration.state() == CalibrationState::Done {
            self.calibration_deadline = None;
            info!("steering calibrated");
            self.finish_calibration(Ok(()));
            self.emit(SessionEvent::Calibration(CalibrationState::Done));
        }
    }

    async fn cancel_calibration(&mut self) -> Result<(), SessionError> {
        let action = self.calibration.handle(CalibrationEvent::Cancel)?;
        if action == CalibrationAction::SendStop {
            info!("steering calibration cancelled");
            self.calibration_deadline = None;
            self.finish_calibration(Err(SessionError::CalibrationCancelled));
            self.emit(SessionEvent::Calibration(CalibrationState::Idle));
        }
        self.perform(action).await
    }

    fn finish_calibration(&mut self, result: CalibrationResult) {
        for waiter in self.calibration_waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
    }

    // ── Notifications ─────────────────────────────────────────────────────────

    fn on_notification(&mut self, frame: &[u8]) {
        trace!(?frame, "rx");
        let message = match decode(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!("dropping notification: {e}");
                return;
            }
        };
        let notification = match Notification::parse(&message) {
            Ok(notification) => notification,
            Err(e) => {
                warn!(message_type = ?message.message_type, "dropping notification: {e}");
                return;
            }
        };

        match &notification {
            Notification::Unsupported(m) => {
                debug!(message_type = ?m.message_type, "ignoring notification");
            }
            Notification::CommandFeedback(entries) => self.on_feedback(entries),
            _ => {}
        }
        if let Some(event) = self.state.apply(&notification) {
            self.emit(event);
        }
    }

    fn on_feedback(&mut self, entries: &[PortFeedback]) {
        for entry in entries {
            trace!(port = entry.port, flags = entry.flags.0, "command feedback");
            if let Some(waiters) = self.feedback_waiters.remove(&entry.port) {
                for waiter in waiters {
                    let _ = waiter.send(());
                }
            }
            if entry.port == ports::COMBINED
                && entry.flags.finished()
                && self.calibration.state() == CalibrationState::Centering
            {
                self.complete_centering();
            }
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    fn mark_disconnected(&mut self) {
        self.connected = false;
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.state.clear_connection_state();
        let _ = self.calibration.handle(CalibrationEvent::Disconnected);
        self.calibration_deadline = None;
        self.finish_calibration(Err(SessionError::NotConnected));
        // Dropping the senders resolves pending feedback waits with NotConnected.
        self.feedback_waiters.clear();
        self.speed = 0;
        self.steer = 0;
        self.lights = 0;
        self.emit(SessionEvent::Disconnected);
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn status(&self) -> HubStatus {
        HubStatus {
            connected: self.connected,
            address: self.address.clone(),
            name: self.state.name.clone(),
            firmware_version: self.state.firmware_version.clone(),
            hardware_version: self.state.hardware_version.clone(),
            manufacturer: self.state.manufacturer.clone(),
            battery_level: self.state.battery_level,
            calibration: self.calibration.state(),
            steering_position: self.state.steering_position(),
            devices: self.state.devices.values().cloned().collect(),
            port_values: self
                .state
                .port_values
                .iter()
                .map(|(port, value)| (*port, value.raw.clone()))
                .collect(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
