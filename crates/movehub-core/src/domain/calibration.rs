//! Steering calibration state machine.
//!
//! ```text
//!            Start              WaitElapsed            CenteringFinished
//!   Idle ───────────► Calibrating ───────────► Centering ───────────► Done
//!    ▲                   │                        │                    │
//!    └──── Cancel ───────┴──────── Cancel ────────┘                    │
//!    ▲                                                                 │
//!    └──────────────────────────── Start (re-calibrate) ◄──────────────┘
//! ```
//!
//! The machine is pure: it decides the next state and which frame (if any)
//! the session must write, while the session owns the timers and the
//! transport.  `Disconnected` from any state lands in `Idle` without a write.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where the steering calibration currently stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalibrationState {
    #[default]
    Idle,
    /// Start frame sent, waiting for the hub to find both end-stops.
    Calibrating,
    /// End frame sent, waiting for the steering to reach center.
    Centering,
    Done,
}

impl CalibrationState {
    pub fn in_progress(self) -> bool {
        matches!(self, CalibrationState::Calibrating | CalibrationState::Centering)
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationEvent {
    /// Operator asked for calibration.
    Start,
    /// The end-stop search wait expired.
    WaitElapsed,
    /// Feedback for the combined port reported completion, or the grace
    /// period ran out.
    CenteringFinished,
    Cancel,
    Disconnected,
}

/// What the session has to write in response to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationAction {
    None,
    SendStart,
    SendEnd,
    /// Coast the steering motor.
    SendStop,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CalibrationError {
    /// `Start` arrived while a calibration was still running.
    #[error("steering calibration already in progress")]
    CalibrationInProgress,
}

/// Pure calibration transitions.
#[derive(Debug, Clone, Default)]
pub struct CalibrationMachine {
    state: CalibrationState,
}

impl CalibrationMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// Applies `event` and returns the write the session must perform.
    ///
    /// Events that do not apply to the current state (a timer that fired
    /// after a cancel, say) are ignored and yield [`CalibrationAction::None`].
    ///
    /// # Errors
    ///
    /// [`CalibrationError::CalibrationInProgress`] for `Start` while
    /// `Calibrating` or `Centering`.  The state is left untouched.
    pub fn handle(&mut self, event: CalibrationEvent) -> Result<CalibrationAction, CalibrationError> {
        use CalibrationEvent as E;
        use CalibrationState as S;

        let (next, action) = match (self.state, event) {
            (S::Idle | S::Done, E::Start) => (S::Calibrating, CalibrationAction::SendStart),
            (S::Calibrating | S::Centering, E::Start) => {
                return Err(CalibrationError::CalibrationInProgress)
            }
            (S::Calibrating, E::WaitElapsed) => (S::Centering, CalibrationAction::SendEnd),
            (S::Centering, E::CenteringFinished) => (S::Done, CalibrationAction::None),
            (S::Calibrating | S::Centering, E::Cancel) => (S::Idle, CalibrationAction::SendStop),
            (_, E::Disconnected) => (S::Idle, CalibrationAction::None),
            (state, _) => (state, CalibrationAction::None),
        };

        if next != self.state {
            tracing::debug!(from = ?self.state, to = ?next, ?event, "calibration transition");
        }
        self.state = next;
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine_in(state: CalibrationState) -> CalibrationMachine {
        CalibrationMachine { state }
    }

    #[test]
    fn test_full_sequence_reaches_done() {
        // Arrange
        let mut m = CalibrationMachine::new();

        // Act / Assert
        assert_eq!(m.handle(CalibrationEvent::Start), Ok(CalibrationAction::SendStart));
        assert_eq!(m.state(), CalibrationState::Calibrating);
        assert_eq!(m.handle(CalibrationEvent::WaitElapsed), Ok(CalibrationAction::SendEnd));
        assert_eq!(m.state(), CalibrationState::Centering);
        assert_eq!(m.handle(CalibrationEvent::CenteringFinished), Ok(CalibrationAction::None));
        assert_eq!(m.state(), CalibrationState::Done);
    }

    #[test]
    fn test_start_while_calibrating_is_rejected_without_change() {
        let mut m = machine_in(CalibrationState::Calibrating);
        assert_eq!(
            m.handle(CalibrationEvent::Start),
            Err(CalibrationError::CalibrationInProgress)
        );
        assert_eq!(m.state(), CalibrationState::Calibrating);
    }

    #[test]
    fn test_start_while_centering_is_rejected() {
        let mut m = machine_in(CalibrationState::Centering);
        assert!(m.handle(CalibrationEvent::Start).is_err());
        assert_eq!(m.state(), CalibrationState::Centering);
    }

    #[test]
    fn test_recalibrate_from_done() {
        let mut m = machine_in(CalibrationState::Done);
        assert_eq!(m.handle(CalibrationEvent::Start), Ok(CalibrationAction::SendStart));
        assert_eq!(m.state(), CalibrationState::Calibrating);
    }

    #[test]
    fn test_cancel_during_centering_sends_stop() {
        let mut m = machine_in(CalibrationState::Centering);
        assert_eq!(m.handle(CalibrationEvent::Cancel), Ok(CalibrationAction::SendStop));
        assert_eq!(m.state(), CalibrationState::Idle);
    }

    #[test]
    fn test_cancel_when_idle_or_done_is_noop() {
        for state in [CalibrationState::Idle, CalibrationState::Done] {
            let mut m = machine_in(state);
            assert_eq!(m.handle(CalibrationEvent::Cancel), Ok(CalibrationAction::None));
            assert_eq!(m.state(), state);
        }
    }

    #[test]
    fn test_disconnect_forces_idle_without_write() {
        for state in [
            CalibrationState::Calibrating,
            CalibrationState::Centering,
            CalibrationState::Done,
        ] {
            let mut m = machine_in(state);
            assert_eq!(m.handle(CalibrationEvent::Disconnected), Ok(CalibrationAction::None));
            assert_eq!(m.state(), CalibrationState::Idle);
        }
    }

    #[test]
    fn test_stale_wait_after_cancel_is_ignored() {
        let mut m = machine_in(CalibrationState::Idle);
        assert_eq!(m.handle(CalibrationEvent::WaitElapsed), Ok(CalibrationAction::None));
        assert_eq!(m.state(), CalibrationState::Idle);
    }
}
