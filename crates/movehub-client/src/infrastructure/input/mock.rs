//! Scripted input source for tests.

use std::time::Duration;

use movehub_core::InputEvent;
use tokio::sync::mpsc;

use super::{InputError, InputSource};

/// Replays a fixed script of events, optionally spaced out in time.
///
/// Each entry is `(delay before the event, event)`.  Delays use
/// `tokio::time`, so they are deterministic under a paused test clock.
pub struct ScriptedInput {
    script: Option<Vec<(Duration, InputEvent)>>,
}

impl ScriptedInput {
    pub fn new(script: Vec<(Duration, InputEvent)>) -> Self {
        Self {
            script: Some(script),
        }
    }

    /// All events at once, no delays.
    pub fn immediate(events: impl IntoIterator<Item = InputEvent>) -> Self {
        Self::new(events.into_iter().map(|e| (Duration::ZERO, e)).collect())
    }
}

impl InputSource for ScriptedInput {
    fn events(&mut self) -> Result<mpsc::Receiver<InputEvent>, InputError> {
        let script = self.script.take().ok_or(InputError::AlreadyStarted)?;
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            for (delay, event) in script {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}
