//! Operator input and the rules that turn it into drive state.
//!
//! Inputs arrive as normalized [`InputEvent`]s no matter where they came
//! from (a raw terminal, a gamepad driver, a test).  [`InputMapper`] folds
//! them into a [`ControlInputState`], which the control loop samples at a
//! fixed rate and turns into combined motor commands.
//!
//! Keyboard steering is expressed in degrees (`-90..=90`, 15° per key press)
//! and scaled linearly onto the hub's `-100..=100` steering range.  Gamepad
//! sticks already report `-100..=100` and are used as is after the deadzone.

use serde::{Deserialize, Serialize};

/// Steering angle, in degrees, that maps to full lock (`±100`).
pub const STEER_FULL_LOCK_DEGREES: i32 = 90;

// ── Input events ──────────────────────────────────────────────────────────────

/// Discrete keyboard commands after escape sequences have been decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Forward,
    Reverse,
    Left,
    Right,
    /// Coast to a stop and center the steering.
    Stop,
    /// Stop and hold speed at zero until the next drive key.
    Brake,
    ToggleLights,
    Quit,
}

/// Gamepad buttons, Xbox layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    A,
    B,
    X,
    Y,
    LeftBumper,
    RightBumper,
    Start,
    Back,
    Xbox,
    LeftStick,
    RightStick,
}

/// Gamepad analog axes.  Sticks report `-100..=100`, triggers `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    LeftStickX,
    LeftStickY,
    RightStickX,
    RightStickY,
    LeftTrigger,
    RightTrigger,
}

/// One normalized operator input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Key(Key),
    Button { button: Button, pressed: bool },
    Axis { axis: Axis, value: i32 },
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Live drive state sampled by the control loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlInputState {
    /// `-100..=100`, positive is forward.
    pub drive_speed: i8,
    /// `-100..=100`, positive is right.
    pub steer_angle: i8,
    /// `0..=100`.
    pub lights_level: u8,
    pub braking: bool,
}

/// Tunables for the mapping rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Speed change per forward/reverse key press.
    pub speed_step: i32,
    /// Steering change per left/right key press, in degrees.
    pub steer_step_degrees: i32,
    /// Keyboard steering limit, in degrees.
    pub steer_limit_degrees: i32,
    /// Stick values with a smaller magnitude read as zero.
    pub stick_deadzone: i32,
    /// Lights level used when lights are toggled on.
    pub lights_on_level: i32,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            speed_step: 20,
            steer_step_degrees: 15,
            steer_limit_degrees: STEER_FULL_LOCK_DEGREES,
            stick_deadzone: 15,
            lights_on_level: 100,
        }
    }
}

/// Scales a steering angle in degrees onto the hub's `-100..=100` range.
///
/// ```rust
/// use movehub_core::domain::control::scale_steer_degrees;
///
/// assert_eq!(scale_steer_degrees(90), 100);
/// assert_eq!(scale_steer_degrees(-45), -50);
/// assert_eq!(scale_steer_degrees(15), 17);
/// ```
pub fn scale_steer_degrees(degrees: i32) -> i32 {
    let scaled = (degrees as f64 * 100.0 / STEER_FULL_LOCK_DEGREES as f64).round() as i32;
    scaled.clamp(-100, 100)
}

/// Whether the caller should keep consuming input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapOutcome {
    Continue,
    Quit,
}

/// Folds input events into a [`ControlInputState`].
#[derive(Debug, Clone)]
pub struct InputMapper {
    config: MappingConfig,
    state: ControlInputState,
    left_trigger: i32,
    right_trigger: i32,
    steer_degrees: i32,
    brake_held: bool,
}

impl InputMapper {
    pub fn new(config: MappingConfig) -> Self {
        Self {
            config,
            state: ControlInputState::default(),
            left_trigger: 0,
            right_trigger: 0,
            steer_degrees: 0,
            brake_held: false,
        }
    }

    pub fn state(&self) -> ControlInputState {
        self.state
    }

    /// Applies one event.  Returns [`MapOutcome::Quit`] for quit inputs.
    pub fn apply(&mut self, event: InputEvent) -> MapOutcome {
        match event {
            InputEvent::Key(key) => return self.apply_key(key),
            InputEvent::Button { button, pressed } => return self.apply_button(button, pressed),
            InputEvent::Axis { axis, value } => self.apply_axis(axis, value),
        }
        MapOutcome::Continue
    }

    fn apply_key(&mut self, key: Key) -> MapOutcome {
        let step = self.config.speed_step;
        let speed = self.state.drive_speed as i32;
        match key {
            // Reversing direction goes through zero first.
            Key::Forward => {
                self.state.braking = false;
                self.set_speed(if speed >= 0 { speed + step } else { 0 });
            }
            Key::Reverse => {
                self.state.braking = false;
                self.set_speed(if speed <= 0 { speed - step } else { 0 });
            }
            Key::Left => self.set_steer_degrees(self.steer_degrees - self.config.steer_step_degrees),
            Key::Right => self.set_steer_degrees(self.steer_degrees + self.config.steer_step_degrees),
            Key::Stop => {
                self.state.braking = false;
                self.set_speed(0);
                self.set_steer_degrees(0);
            }
            Key::Brake => {
                self.state.braking = true;
                self.set_speed(0);
                self.set_steer_degrees(0);
            }
            Key::ToggleLights => self.toggle_lights(),
            Key::Quit => return MapOutcome::Quit,
        }
        MapOutcome::Continue
    }

    fn apply_button(&mut self, button: Button, pressed: bool) -> MapOutcome {
        match (button, pressed) {
            (Button::B, true) => {
                self.brake_held = true;
                self.state.braking = true;
                self.set_speed(0);
            }
            (Button::B, false) => {
                self.brake_held = false;
                self.state.braking = false;
                self.update_trigger_speed();
            }
            (Button::Y, true) => self.toggle_lights(),
            (Button::X, true) => {
                self.set_speed(0);
                self.set_steer(0);
            }
            (Button::Back, true) => return MapOutcome::Quit,
            _ => {}
        }
        MapOutcome::Continue
    }

    fn apply_axis(&mut self, axis: Axis, value: i32) {
        match axis {
            Axis::RightTrigger => {
                self.right_trigger = value.clamp(0, 100);
                self.update_trigger_speed();
            }
            Axis::LeftTrigger => {
                self.left_trigger = value.clamp(0, 100);
                self.update_trigger_speed();
            }
            Axis::LeftStickX => {
                let value = if value.abs() < self.config.stick_deadzone {
                    0
                } else {
                    value.clamp(-100, 100)
                };
                self.set_steer(value);
            }
            Axis::LeftStickY | Axis::RightStickX | Axis::RightStickY => {}
        }
    }

    fn update_trigger_speed(&mut self) {
        if self.brake_held {
            return;
        }
        self.set_speed(self.right_trigger - self.left_trigger);
    }

    fn toggle_lights(&mut self) {
        self.state.lights_level = if self.state.lights_level == 0 {
            self.config.lights_on_level.clamp(0, 100) as u8
        } else {
            0
        };
    }

    fn set_speed(&mut self, speed: i32) {
        self.state.drive_speed = speed.clamp(-100, 100) as i8;
    }

    fn set_steer_degrees(&mut self, degrees: i32) {
        // A negative limit from a hand-edited config would make clamp panic.
        let limit = self.config.steer_limit_degrees.clamp(0, STEER_FULL_LOCK_DEGREES);
        self.steer_degrees = degrees.clamp(-limit, limit);
        self.state.steer_angle = scale_steer_degrees(self.steer_degrees) as i8;
    }

    fn set_steer(&mut self, steer: i32) {
        self.state.steer_angle = steer as i8;
        self.steer_degrees = steer * STEER_FULL_LOCK_DEGREES / 100;
    }
}

impl Default for InputMapper {
    fn default() -> Self {
        Self::new(MappingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: Key) -> InputEvent {
        InputEvent::Key(k)
    }

    fn axis(axis: Axis, value: i32) -> InputEvent {
        InputEvent::Axis { axis, value }
    }

    fn button(button: Button, pressed: bool) -> InputEvent {
        InputEvent::Button { button, pressed }
    }

    #[test]
    fn test_forward_steps_by_twenty_up_to_100() {
        let mut m = InputMapper::default();
        for expected in [20, 40, 60, 80, 100, 100] {
            m.apply(key(Key::Forward));
            assert_eq!(m.state().drive_speed, expected);
        }
    }

    #[test]
    fn test_reverse_while_moving_forward_stops_first() {
        // Arrange
        let mut m = InputMapper::default();
        m.apply(key(Key::Forward));
        m.apply(key(Key::Forward));

        // Act
        m.apply(key(Key::Reverse));

        // Assert
        assert_eq!(m.state().drive_speed, 0);
        m.apply(key(Key::Reverse));
        assert_eq!(m.state().drive_speed, -20);
    }

    #[test]
    fn test_keyboard_steering_clamps_at_limit() {
        let mut m = InputMapper::default();
        for _ in 0..10 {
            m.apply(key(Key::Right));
        }
        assert_eq!(m.state().steer_angle, 100);
        m.apply(key(Key::Left));
        // 75 degrees
        assert_eq!(m.state().steer_angle, 83);
    }

    #[test]
    fn test_negative_steer_limit_keeps_steering_centered() {
        let mut m = InputMapper::new(MappingConfig {
            steer_limit_degrees: -10,
            ..MappingConfig::default()
        });
        m.apply(key(Key::Left));
        assert_eq!(m.state().steer_angle, 0);
    }

    #[test]
    fn test_brake_key_latches_until_drive_key() {
        let mut m = InputMapper::default();
        m.apply(key(Key::Forward));
        m.apply(key(Key::Brake));
        assert!(m.state().braking);
        assert_eq!(m.state().drive_speed, 0);

        m.apply(key(Key::Left));
        assert!(m.state().braking);

        m.apply(key(Key::Forward));
        assert!(!m.state().braking);
        assert_eq!(m.state().drive_speed, 20);
    }

    #[test]
    fn test_stop_key_zeroes_speed_and_steer() {
        let mut m = InputMapper::default();
        m.apply(key(Key::Forward));
        m.apply(key(Key::Right));
        m.apply(key(Key::Stop));
        assert_eq!(m.state().drive_speed, 0);
        assert_eq!(m.state().steer_angle, 0);
    }

    #[test]
    fn test_triggers_set_speed_difference() {
        let mut m = InputMapper::default();
        m.apply(axis(Axis::RightTrigger, 80));
        m.apply(axis(Axis::LeftTrigger, 30));
        assert_eq!(m.state().drive_speed, 50);
        m.apply(axis(Axis::RightTrigger, 0));
        assert_eq!(m.state().drive_speed, -30);
    }

    #[test]
    fn test_b_button_holds_speed_at_zero_while_pressed() {
        let mut m = InputMapper::default();
        m.apply(axis(Axis::RightTrigger, 60));
        m.apply(button(Button::B, true));
        assert_eq!(m.state().drive_speed, 0);
        assert!(m.state().braking);

        m.apply(axis(Axis::RightTrigger, 90));
        assert_eq!(m.state().drive_speed, 0);

        m.apply(button(Button::B, false));
        assert!(!m.state().braking);
        assert_eq!(m.state().drive_speed, 90);
    }

    #[test]
    fn test_stick_deadzone() {
        let mut m = InputMapper::default();
        m.apply(axis(Axis::LeftStickX, 14));
        assert_eq!(m.state().steer_angle, 0);
        m.apply(axis(Axis::LeftStickX, -15));
        assert_eq!(m.state().steer_angle, -15);
        m.apply(axis(Axis::LeftStickX, 250));
        assert_eq!(m.state().steer_angle, 100);
    }

    #[test]
    fn test_y_toggles_lights() {
        let mut m = InputMapper::default();
        m.apply(button(Button::Y, true));
        assert_eq!(m.state().lights_level, 100);
        m.apply(button(Button::Y, false));
        assert_eq!(m.state().lights_level, 100);
        m.apply(button(Button::Y, true));
        assert_eq!(m.state().lights_level, 0);
    }

    #[test]
    fn test_x_stops() {
        let mut m = InputMapper::default();
        m.apply(axis(Axis::RightTrigger, 50));
        m.apply(axis(Axis::LeftStickX, 70));
        m.apply(button(Button::X, true));
        assert_eq!(m.state().drive_speed, 0);
        assert_eq!(m.state().steer_angle, 0);
    }

    #[test]
    fn test_quit_inputs() {
        let mut m = InputMapper::default();
        assert_eq!(m.apply(key(Key::Quit)), MapOutcome::Quit);
        assert_eq!(m.apply(button(Button::Back, true)), MapOutcome::Quit);
        assert_eq!(m.apply(button(Button::Back, false)), MapOutcome::Continue);
    }

    #[test]
    fn test_scale_steer_degrees_is_linear_and_clamped() {
        assert_eq!(scale_steer_degrees(0), 0);
        assert_eq!(scale_steer_degrees(30), 33);
        assert_eq!(scale_steer_degrees(-90), -100);
        assert_eq!(scale_steer_degrees(180), 100);
    }
}
