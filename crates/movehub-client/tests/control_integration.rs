//! Integration tests for the control loop.
//!
//! The loop runs against a real session over `MockTransport`, fed by a
//! `ScriptedInput`.  The tokio clock is paused, so tick timing is exact:
//! at the default 20 Hz the loop may write at most one combined command
//! every 50 ms no matter how fast input arrives.

use std::time::Duration;

use movehub_client::application::control_loop::{
    ControlError, ControlLoop, ControlLoopConfig, ControlOutcome, InputSource,
};
use movehub_client::application::session::{HubHandle, HubSession, SessionConfig, SessionError};
use movehub_client::infrastructure::input::mock::ScriptedInput;
use movehub_client::infrastructure::transport::mock::{MockLink, MockTransport};
use movehub_core::domain::control::Key;
use movehub_core::domain::devices::ports;
use movehub_core::domain::motor::parse_combined;
use movehub_core::InputEvent;

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn connect(calibrate: bool) -> (HubHandle, MockLink) {
    let (transport, link) = MockTransport::new();
    let config = SessionConfig {
        query_properties: false,
        attach_settle: Duration::ZERO,
        ..SessionConfig::default()
    };
    let hub = HubSession::connect(transport, "AA:BB", config)
        .await
        .expect("connect");
    if calibrate {
        hub.calibrate().await.expect("calibrate");
    }
    link.clear_writes();
    (hub, link)
}

fn key(key: Key) -> InputEvent {
    InputEvent::Key(key)
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// `(speed, steer, lights)` of every combined command written so far.
fn combined_writes(link: &MockLink) -> Vec<(i8, i8, u8)> {
    link.writes()
        .iter()
        .filter(|f| f.get(3) == Some(&ports::COMBINED))
        .map(|f| parse_combined(f).expect("combined frame"))
        .collect()
}

async fn run_script(
    hub: &HubHandle,
    script: Vec<(Duration, InputEvent)>,
) -> Result<ControlOutcome, ControlError> {
    let mut input = ScriptedInput::new(script);
    let events = input.events().expect("events");
    ControlLoop::new(hub.clone(), ControlLoopConfig::default())
        .run(events)
        .await
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_commands_are_rate_limited_to_one_per_tick() {
    // Arrange: four state changes within 15 ms, quit much later.
    let (hub, link) = connect(true).await;
    let mut input = ScriptedInput::new(vec![
        (ms(0), key(Key::Forward)),
        (ms(5), key(Key::Forward)),
        (ms(5), key(Key::Right)),
        (ms(5), key(Key::Forward)),
        (ms(500), key(Key::Quit)),
    ]);
    let events = input.events().expect("events");
    let task = tokio::spawn({
        let hub = hub.clone();
        async move {
            ControlLoop::new(hub, ControlLoopConfig::default())
                .run(events)
                .await
        }
    });

    // Act
    tokio::time::sleep(ms(60)).await;
    let early = combined_writes(&link);
    let outcome = task.await.expect("join").expect("run");

    // Assert
    assert!(!early.is_empty() && early.len() <= 2, "writes by 60 ms: {early:?}");
    assert_eq!(early.last(), Some(&(60, 17, 0)));
    assert_eq!(outcome, ControlOutcome::Quit);
}

#[tokio::test(start_paused = true)]
async fn test_thousand_changes_within_one_period_send_at_most_two_commands() {
    // Arrange: one speed step, then 999 alternating steer steps spread over
    // 40 ms.  Every event changes the state; the last one leaves it steering left.
    let (hub, link) = connect(true).await;
    let mut script = vec![(ms(0), key(Key::Forward))];
    for i in 1..1000u64 {
        let delay = if i % 25 == 0 { ms(1) } else { ms(0) };
        let steer = if i % 2 == 1 { Key::Left } else { Key::Right };
        script.push((delay, key(steer)));
    }
    script.push((ms(500), key(Key::Quit)));
    let mut input = ScriptedInput::new(script);
    let events = input.events().expect("events");
    let task = tokio::spawn({
        let hub = hub.clone();
        async move {
            ControlLoop::new(hub, ControlLoopConfig::default())
                .run(events)
                .await
        }
    });

    // Act
    tokio::time::sleep(ms(50)).await;
    let in_window = combined_writes(&link).len();
    let outcome = task.await.expect("join").expect("run");

    // Assert
    assert!(in_window <= 2, "writes in the first 50 ms: {in_window}");
    assert_eq!(outcome, ControlOutcome::Quit);
    let writes = combined_writes(&link);
    assert!(writes.len() <= 3, "all writes: {writes:?}");
    assert_eq!(writes[writes.len() - 2..], [(20, -17, 0), (0, 0, 0)]);
}

#[tokio::test(start_paused = true)]
async fn test_burst_within_one_tick_coalesces() {
    let (hub, link) = connect(true).await;

    let outcome = run_script(
        &hub,
        vec![
            (ms(0), key(Key::Forward)),
            (ms(0), key(Key::Forward)),
            (ms(0), key(Key::Forward)),
            (ms(200), key(Key::Quit)),
        ],
    )
    .await
    .expect("run");

    // One drive command with the final speed, then the stop on quit.
    assert_eq!(outcome, ControlOutcome::Quit);
    assert_eq!(combined_writes(&link), vec![(60, 0, 0), (0, 0, 0)]);
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_state_is_not_resent() {
    let (hub, link) = connect(true).await;

    // Steering left then right again ends where it started.
    run_script(
        &hub,
        vec![
            (ms(0), key(Key::Left)),
            (ms(0), key(Key::Right)),
            (ms(300), key(Key::Quit)),
        ],
    )
    .await
    .expect("run");

    // Only the stop on quit.
    assert_eq!(combined_writes(&link), vec![(0, 0, 0)]);
}

#[tokio::test(start_paused = true)]
async fn test_brake_sends_zero_speed() {
    let (hub, link) = connect(true).await;

    run_script(
        &hub,
        vec![
            (ms(0), key(Key::Forward)),
            (ms(100), key(Key::Brake)),
            (ms(100), key(Key::Quit)),
        ],
    )
    .await
    .expect("run");

    let writes = combined_writes(&link);
    assert_eq!(writes[0], (20, 0, 0));
    assert_eq!(writes[1], (0, 0, 0));
}

#[tokio::test(start_paused = true)]
async fn test_lights_toggle_keeps_level_through_stop() {
    let (hub, link) = connect(true).await;

    run_script(
        &hub,
        vec![(ms(0), key(Key::ToggleLights)), (ms(100), key(Key::Quit))],
    )
    .await
    .expect("run");

    assert_eq!(combined_writes(&link), vec![(0, 0, 100), (0, 0, 100)]);
}

#[tokio::test(start_paused = true)]
async fn test_end_of_input_stops_the_hub() {
    let (hub, link) = connect(true).await;
    let mut input = ScriptedInput::immediate([key(Key::Forward)]);
    let events = input.events().expect("events");

    let outcome = ControlLoop::new(hub.clone(), ControlLoopConfig::default())
        .run(events)
        .await
        .expect("run");

    assert_eq!(outcome, ControlOutcome::InputClosed);
    assert_eq!(combined_writes(&link).last(), Some(&(0, 0, 0)));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_ends_loop_with_disconnected() {
    // Arrange
    let (hub, link) = connect(true).await;
    let mut input = ScriptedInput::new(vec![(ms(10_000), key(Key::Quit))]);
    let events = input.events().expect("events");
    let task = tokio::spawn({
        let hub = hub.clone();
        async move {
            ControlLoop::new(hub, ControlLoopConfig::default())
                .run(events)
                .await
        }
    });
    tokio::time::sleep(ms(100)).await;

    // Act
    link.drop_link();

    // Assert
    let outcome = task.await.expect("join").expect("run");
    assert_eq!(outcome, ControlOutcome::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_write_failure_terminates_with_error() {
    let (hub, link) = connect(true).await;
    link.set_fail_writes(true);

    let result = run_script(
        &hub,
        vec![(ms(0), key(Key::Forward)), (ms(1000), key(Key::Quit))],
    )
    .await;

    assert!(matches!(
        result,
        Err(ControlError::Session(SessionError::CommandWriteFailed(_)))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_uncalibrated_hub_gets_no_combined_commands() {
    let (hub, link) = connect(false).await;

    let outcome = run_script(
        &hub,
        vec![(ms(0), key(Key::Forward)), (ms(200), key(Key::Quit))],
    )
    .await
    .expect("run");

    // The drive is rejected before any I/O; quit falls back to direct coasts.
    assert_eq!(outcome, ControlOutcome::Quit);
    assert!(combined_writes(&link).is_empty());
    assert_eq!(link.writes().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_quit_button_on_gamepad() {
    let (hub, _link) = connect(true).await;

    let outcome = run_script(
        &hub,
        vec![(
            ms(0),
            InputEvent::Button {
                button: movehub_core::domain::control::Button::Back,
                pressed: true,
            },
        )],
    )
    .await
    .expect("run");

    assert_eq!(outcome, ControlOutcome::Quit);
}
