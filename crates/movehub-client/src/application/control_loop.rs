//! Real-time control loop.
//!
//! Input events are folded into a [`ControlInputState`] as they arrive.  A
//! fixed-rate ticker samples that state and sends one combined command
//! through the session only when it differs from the last one sent, so a
//! burst of key presses within one tick costs a single write.
//!
//! ```text
//!  InputSource ──► mpsc<InputEvent> ──┐
//!                                     ├─► select! { biased; session events, input, tick }
//!  HubHandle::subscribe() ────────────┘                 │
//!                                                        └─► HubHandle::drive / stop
//! ```

use std::time::Duration;

use movehub_core::{ControlInputState, InputEvent, InputMapper, MapOutcome, MappingConfig};
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::application::session::{HubHandle, SessionError, SessionEvent};

// ── Input seam ────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum InputError {
    /// `events()` was called a second time.
    #[error("input source already started")]
    AlreadyStarted,

    #[error("terminal error: {0}")]
    Terminal(#[from] std::io::Error),
}

/// A producer of normalized operator input.
pub trait InputSource: Send {
    /// Starts producing events.  The channel closes when the source ends.
    fn events(&mut self) -> Result<mpsc::Receiver<InputEvent>, InputError>;
}

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlLoopConfig {
    /// Commands per second at most.
    pub tick_rate_hz: u32,
    pub mapping: MappingConfig,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 20,
            mapping: MappingConfig::default(),
        }
    }
}

impl ControlLoopConfig {
    pub fn tick_period(&self) -> Duration {
        let hz = u64::from(self.tick_rate_hz.max(1));
        Duration::from_millis((1000 / hz).max(1))
    }
}

// ── Outcome ───────────────────────────────────────────────────────────────────

/// Why the loop ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    /// The operator asked to quit.
    Quit,
    /// The input stream ended.
    InputClosed,
    /// The hub went away.
    Disconnected,
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

// ── Loop ──────────────────────────────────────────────────────────────────────

pub struct ControlLoop {
    hub: HubHandle,
    config: ControlLoopConfig,
    mapper: InputMapper,
    last_sent: ControlInputState,
}

impl ControlLoop {
    pub fn new(hub: HubHandle, config: ControlLoopConfig) -> Self {
        let mapper = InputMapper::new(config.mapping.clone());
        Self {
            hub,
            config,
            mapper,
            // The hub is idle after connect or calibration, so an all-zero
            // state needs no write.
            last_sent: ControlInputState::default(),
        }
    }

    /// Current live state.
    pub fn state(&self) -> ControlInputState {
        self.mapper.state()
    }

    /// Runs until quit, end of input or disconnect.
    ///
    /// # Errors
    ///
    /// [`ControlError::Session`] when a command write fails.
    pub async fn run(
        &mut self,
        mut input: mpsc::Receiver<InputEvent>,
    ) -> Result<ControlOutcome, ControlError> {
        let mut session_events = self.hub.subscribe();
        let mut ticker = tokio::time::interval(self.config.tick_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(tick_rate_hz = self.config.tick_rate_hz, "control loop started");

        loop {
            tokio::select! {
                biased;

                event = session_events.recv() => match event {
                    Ok(SessionEvent::Disconnected) | Err(RecvError::Closed) => {
                        warn!("hub disconnected, control loop stopping");
                        return Ok(ControlOutcome::Disconnected);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "control loop lagged behind session events");
                    }
                },

                event = input.recv() => match event {
                    Some(event) => {
                        if self.mapper.apply(event) == MapOutcome::Quit {
                            return self.finish(ControlOutcome::Quit).await;
                        }
                    }
                    None => return self.finish(ControlOutcome::InputClosed).await,
                },

                _ = ticker.tick() => {
                    if let Some(outcome) = self.emit_if_changed().await? {
                        return Ok(outcome);
                    }
                }
            }
        }
    }

    async fn emit_if_changed(&mut self) -> Result<Option<ControlOutcome>, ControlError> {
        let state = self.mapper.state();
        if state == self.last_sent {
            return Ok(None);
        }

        // Braking is a zero-speed combined command; the mapper has already
        // zeroed the speed.
        let result = self
            .hub
            .drive(
                i32::from(state.drive_speed),
                i32::from(state.steer_angle),
                i32::from(state.lights_level),
            )
            .await;
        // Recorded even on rejection so an invalid state is not resent every tick.
        self.last_sent = state;

        match result {
            Ok(()) => {
                debug!(
                    speed = state.drive_speed,
                    steer = state.steer_angle,
                    lights = state.lights_level,
                    braking = state.braking,
                    "drive state sent"
                );
                Ok(None)
            }
            Err(SessionError::NotConnected) => Ok(Some(ControlOutcome::Disconnected)),
            Err(SessionError::Command(e)) => {
                warn!("drive command rejected: {e}");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn finish(&mut self, outcome: ControlOutcome) -> Result<ControlOutcome, ControlError> {
        info!(?outcome, "control loop stopping");
        match self.hub.stop().await {
            Ok(()) => Ok(outcome),
            Err(SessionError::NotConnected) => Ok(ControlOutcome::Disconnected),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_period_for_default_rate() {
        assert_eq!(ControlLoopConfig::default().tick_period(), Duration::from_millis(50));
    }

    #[test]
    fn test_tick_period_never_zero() {
        let config = ControlLoopConfig {
            tick_rate_hz: 5000,
            ..Default::default()
        };
        assert_eq!(config.tick_period(), Duration::from_millis(1));

        let zero = ControlLoopConfig {
            tick_rate_hz: 0,
            ..Default::default()
        };
        assert_eq!(zero.tick_period(), Duration::from_millis(1000));
    }
}
