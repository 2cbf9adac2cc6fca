//! Operator input adapters.
//!
//! - **`keyboard`** – crossterm raw-mode reader that maps w/a/s/d, arrow
//!   keys and the stop/brake/lights/quit keys.
//! - **`mock`** – scripted source for tests.

pub mod keyboard;
pub mod mock;

pub use crate::application::control_loop::{InputError, InputSource};
