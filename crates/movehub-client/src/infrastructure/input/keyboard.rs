//! Terminal keyboard input.
//!
//! The terminal is switched to raw mode so that single key presses arrive
//! without waiting for Enter.  crossterm key events are mapped to [`Key`]s:
//!
//! | Input                 | Key            |
//! |-----------------------|----------------|
//! | `w`, ↑                | `Forward`      |
//! | `s`, ↓                | `Reverse`      |
//! | `a`, ←                | `Left`         |
//! | `d`, →                | `Right`        |
//! | `x`, space            | `Stop`         |
//! | `b`                   | `Brake`        |
//! | `l`                   | `ToggleLights` |
//! | `q`, Esc, Ctrl-C      | `Quit`         |

use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use movehub_core::domain::control::Key;
use movehub_core::InputEvent;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{InputError, InputSource};

/// How long the reader thread waits for a key before checking whether the
/// receiver is still there.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Maps one terminal key event to a drive key.  Key releases are ignored;
/// Windows consoles report them alongside presses.
pub fn map_key_event(key: &KeyEvent) -> Option<Key> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') | KeyCode::Char('C') => Some(Key::Quit),
            _ => None,
        };
    }
    match key.code {
        KeyCode::Up => Some(Key::Forward),
        KeyCode::Down => Some(Key::Reverse),
        KeyCode::Left => Some(Key::Left),
        KeyCode::Right => Some(Key::Right),
        KeyCode::Esc => Some(Key::Quit),
        KeyCode::Char(c) => match c.to_ascii_lowercase() {
            'w' => Some(Key::Forward),
            's' => Some(Key::Reverse),
            'a' => Some(Key::Left),
            'd' => Some(Key::Right),
            'x' | ' ' => Some(Key::Stop),
            'b' => Some(Key::Brake),
            'l' => Some(Key::ToggleLights),
            'q' => Some(Key::Quit),
            _ => None,
        },
        _ => None,
    }
}

/// Reads key presses from the terminal on a blocking thread.
///
/// The thread stops after `Quit`, when the receiver is dropped, or when the
/// terminal reports an error.  Put the terminal in raw mode with
/// [`RawMode`] first, otherwise keys arrive line by line.
#[derive(Debug, Default)]
pub struct TerminalKeyboard {
    started: bool,
}

impl TerminalKeyboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InputSource for TerminalKeyboard {
    fn events(&mut self) -> Result<mpsc::Receiver<InputEvent>, InputError> {
        if self.started {
            return Err(InputError::AlreadyStarted);
        }
        self.started = true;

        let (tx, rx) = mpsc::channel(64);
        std::thread::Builder::new()
            .name("movehub-keyboard".into())
            .spawn(move || {
                if let Err(e) = read_keys(&tx) {
                    warn!("keyboard input ended: {e}");
                }
            })?;
        Ok(rx)
    }
}

fn read_keys(tx: &mpsc::Sender<InputEvent>) -> std::io::Result<()> {
    loop {
        if tx.is_closed() {
            return Ok(());
        }
        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        let Event::Key(key_event) = event::read()? else {
            continue;
        };
        let Some(key) = map_key_event(&key_event) else {
            continue;
        };
        debug!(?key, "key");
        if tx.blocking_send(InputEvent::Key(key)).is_err() || key == Key::Quit {
            return Ok(());
        }
    }
}

/// Puts the terminal into raw mode until dropped.
pub struct RawMode {
    _private: (),
}

impl RawMode {
    pub fn enable() -> Result<Self, InputError> {
        enable_raw_mode()?;
        Ok(Self { _private: () })
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!("failed to restore the terminal: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn keys(codes: &str) -> Vec<Option<Key>> {
        codes.chars().map(|c| map_key_event(&press(KeyCode::Char(c)))).collect()
    }

    #[test]
    fn test_letter_keys() {
        assert_eq!(
            keys("wasdxblq "),
            vec![
                Some(Key::Forward),
                Some(Key::Left),
                Some(Key::Reverse),
                Some(Key::Right),
                Some(Key::Stop),
                Some(Key::Brake),
                Some(Key::ToggleLights),
                Some(Key::Quit),
                Some(Key::Stop),
            ]
        );
    }

    #[test]
    fn test_uppercase_is_accepted() {
        assert_eq!(
            map_key_event(&KeyEvent::new(KeyCode::Char('W'), KeyModifiers::SHIFT)),
            Some(Key::Forward)
        );
    }

    #[test]
    fn test_arrow_keys() {
        let mapped: Vec<_> = [KeyCode::Up, KeyCode::Down, KeyCode::Right, KeyCode::Left]
            .into_iter()
            .map(|code| map_key_event(&press(code)))
            .collect();
        assert_eq!(
            mapped,
            vec![
                Some(Key::Forward),
                Some(Key::Reverse),
                Some(Key::Right),
                Some(Key::Left)
            ]
        );
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        assert_eq!(keys("z1"), vec![None, None]);
        assert_eq!(map_key_event(&press(KeyCode::F(1))), None);
        assert_eq!(map_key_event(&press(KeyCode::Enter)), None);
    }

    #[test]
    fn test_ctrl_c_and_esc_quit() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(map_key_event(&ctrl_c), Some(Key::Quit));
        assert_eq!(map_key_event(&press(KeyCode::Esc)), Some(Key::Quit));
    }

    #[test]
    fn test_other_control_chords_are_ignored() {
        let ctrl_w = KeyEvent::new(KeyCode::Char('w'), KeyModifiers::CONTROL);
        assert_eq!(map_key_event(&ctrl_w), None);
    }

    #[test]
    fn test_key_release_is_ignored() {
        let release = KeyEvent::new_with_kind_and_state(
            KeyCode::Char('w'),
            KeyModifiers::NONE,
            KeyEventKind::Release,
            KeyEventState::NONE,
        );
        assert_eq!(map_key_event(&release), None);
    }
}
