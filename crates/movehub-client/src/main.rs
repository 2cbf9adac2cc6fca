//! `movehub` – command-line driver for the LEGO Technic Move Hub.
//!
//! # Usage
//!
//! ```text
//! movehub [--address <ADDR>] [--config <PATH>] <COMMAND>
//!
//! Commands:
//!   scan       Find nearby hubs and remember one of them
//!   status     Connect and print hub properties and attached devices
//!   drive      Drive at a speed until Ctrl-C or for a while, then stop
//!   steer      Turn the steering to an angle in degrees
//!   stop       Coast the drive motors and center the steering
//!   lights     Set the lights brightness
//!   calibrate  Calibrate the steering and print its position
//!   run        Drive interactively from the keyboard
//!   shutdown   Switch the hub off
//! ```
//!
//! The address comes from `--address`, `MOVEHUB_ADDRESS`, or the `[hub]`
//! section of the config file, in that order.
//!
//! # Keyboard (`run`)
//!
//! | Key           | Action                    |
//! |---------------|---------------------------|
//! | `w` / `↑`     | faster forward            |
//! | `s` / `↓`     | faster reverse            |
//! | `a` / `←`     | steer left                |
//! | `d` / `→`     | steer right               |
//! | `x` / space   | stop and center           |
//! | `b`           | brake                     |
//! | `l`           | toggle lights             |
//! | `q` / Esc / Ctrl-C | quit                 |

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use movehub_client::application::address::{remember_scan_result, resolve_address};
use movehub_client::application::control_loop::{
    ControlLoop, ControlLoopConfig, ControlOutcome, InputSource,
};
use movehub_client::application::session::{HubHandle, HubSession, SessionConfig};
use movehub_client::infrastructure::input::keyboard::{RawMode, TerminalKeyboard};
use movehub_client::infrastructure::storage::config::{
    config_file_path, load_config, AppConfig, FileAddressStore,
};
use movehub_client::infrastructure::transport::ble::{self, BleTransport};
use movehub_core::domain::control::scale_steer_degrees;

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "movehub",
    about = "Drive a LEGO Technic Move Hub over Bluetooth LE",
    version
)]
struct Cli {
    /// Hub address (MAC, or the CoreBluetooth UUID on macOS).
    #[arg(long, global = true, env = "MOVEHUB_ADDRESS")]
    address: Option<String>,

    /// Config file to use instead of the platform default.
    #[arg(long, global = true, env = "MOVEHUB_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Find nearby hubs.
    Scan {
        /// Scan duration in seconds.
        #[arg(long, default_value_t = 10)]
        timeout: u64,
        /// List the hubs without saving any of them.
        #[arg(long)]
        no_save: bool,
    },
    /// Print hub properties and attached devices.
    Status {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Drive at `speed` (-100..=100) until Ctrl-C, or for `--duration`
    /// seconds, then stop.
    Drive {
        #[arg(allow_hyphen_values = true)]
        speed: i32,
        #[arg(long)]
        duration: Option<f64>,
    },
    /// Turn the steering to `angle` degrees (-90..=90, positive is right).
    Steer {
        #[arg(allow_hyphen_values = true)]
        angle: i32,
    },
    /// Coast the drive motors and center the steering.
    Stop,
    /// Set the lights brightness (0..=100).
    Lights { brightness: i32 },
    /// Calibrate the steering.
    Calibrate,
    /// Drive interactively from the keyboard.
    Run,
    /// Switch the hub off.
    Shutdown,
}

impl Command {
    /// Combined commands need calibrated steering.
    fn needs_calibration(&self) -> bool {
        matches!(
            self,
            Command::Calibrate
                | Command::Drive { .. }
                | Command::Steer { .. }
                | Command::Stop
                | Command::Run
        )
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => config_file_path()?,
    };
    let config = load_config(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    // RUST_LOG wins over the configured level.  Logs go to stderr so they do
    // not mix with `status --json` output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut store = FileAddressStore::new(config_path, config.clone());

    if let Command::Scan { timeout, no_save } = cli.command {
        return scan(Duration::from_secs(timeout), no_save, &mut store).await;
    }

    let Some(address) = resolve_address(cli.address.as_deref(), &store) else {
        bail!("no hub address: pass --address or run `movehub scan` first");
    };
    let hub = open_session(&address, &config).await?;

    if cli.command.needs_calibration() {
        calibrate(&hub).await?;
    }

    let result = run_command(cli.command, &hub, &config).await;
    if let Err(e) = hub.disconnect().await {
        warn!("disconnect failed: {e}");
    }
    result
}

async fn open_session(address: &str, config: &AppConfig) -> anyhow::Result<HubHandle> {
    let transport = BleTransport::new(Duration::from_millis(config.session.scan_timeout_ms));
    let session_config = SessionConfig::from(&config.session);
    HubSession::connect(transport, address, session_config)
        .await
        .with_context(|| format!("could not connect to hub {address}"))
}

async fn run_command(command: Command, hub: &HubHandle, config: &AppConfig) -> anyhow::Result<()> {
    match command {
        Command::Scan { .. } | Command::Calibrate => {}
        Command::Status { json } => {
            let status = hub.status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
        Command::Drive { speed, duration } => {
            let duration = duration.map(drive_duration).transpose()?;
            hub.drive(speed, 0, 0).await?;
            match duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => {
                    println!("driving, press Ctrl-C to stop");
                    tokio::signal::ctrl_c().await?;
                }
            }
            hub.stop().await?;
        }
        Command::Steer { angle } => {
            hub.drive(0, scale_steer_degrees(angle), 0).await?;
            // Give the motor time to get there before the link closes.
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        Command::Stop => hub.stop().await?,
        Command::Lights { brightness } => hub.set_lights(brightness).await?,
        Command::Run => {
            let control_config = ControlLoopConfig::from(&config.control);
            let outcome = drive_interactively(hub, control_config).await?;
            info!(?outcome, "interactive session ended");
        }
        Command::Shutdown => {
            hub.shutdown_hub().await?;
            println!("hub switched off");
        }
    }
    Ok(())
}

// ── Commands ──────────────────────────────────────────────────────────────────

async fn scan(timeout: Duration, no_save: bool, store: &mut FileAddressStore) -> anyhow::Result<()> {
    let hubs = ble::scan(timeout).await?;
    if hubs.is_empty() {
        println!("no hubs found; is the hub switched on and not connected elsewhere?");
        return Ok(());
    }
    for (i, hub) in hubs.iter().enumerate() {
        let rssi = hub.rssi.map(|r| format!("{r} dBm")).unwrap_or_default();
        println!(
            "{:>2}. {}  {}  {}",
            i + 1,
            hub.address,
            hub.name.as_deref().unwrap_or("<unnamed>"),
            rssi
        );
    }
    if no_save {
        return Ok(());
    }

    let choice = if hubs.len() > 1 {
        println!("save which hub as the default? [1-{}, Enter to skip]", hubs.len());
        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        parse_choice(&line, hubs.len())
    } else {
        None
    };
    match remember_scan_result(&hubs, choice, store)? {
        Some(saved) => println!("saved {} as the default hub", saved.address),
        None if hubs.len() > 1 => println!("no hub saved"),
        None => {}
    }
    Ok(())
}

/// Turns a 1-based list number typed by the operator into an index.
fn parse_choice(line: &str, count: usize) -> Option<usize> {
    match line.trim().parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Some(n - 1),
        _ => None,
    }
}

fn drive_duration(seconds: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(seconds)
        .map_err(|e| anyhow!("invalid --duration {seconds}: {e}"))
}

/// Runs calibration, cancelling it cleanly on Ctrl-C.
async fn calibrate(hub: &HubHandle) -> anyhow::Result<()> {
    println!("calibrating steering...");
    let calibration = hub.start_calibration().await?;
    tokio::select! {
        result = calibration.wait() => result?,
        _ = tokio::signal::ctrl_c() => {
            hub.cancel_calibration().await?;
            bail!("calibration cancelled");
        }
    }
    match hub.steering_position().await? {
        Some(position) => println!("steering calibrated, position {position}"),
        None => println!("steering calibrated"),
    }
    Ok(())
}

async fn drive_interactively(
    hub: &HubHandle,
    config: ControlLoopConfig,
) -> anyhow::Result<ControlOutcome> {
    println!("w/s speed, a/d steer, x stop, b brake, l lights, q quit");
    let _raw = RawMode::enable().context("interactive mode needs a terminal")?;
    let mut keyboard = TerminalKeyboard::new();
    let input = keyboard.events()?;
    let outcome = ControlLoop::new(hub.clone(), config).run(input).await?;
    Ok(outcome)
}

fn print_status(status: &movehub_client::application::session::HubStatus) {
    let unknown = "?";
    println!("address:      {}", status.address);
    println!("name:         {}", status.name.as_deref().unwrap_or(unknown));
    println!("firmware:     {}", status.firmware_version.as_deref().unwrap_or(unknown));
    println!("hardware:     {}", status.hardware_version.as_deref().unwrap_or(unknown));
    println!("manufacturer: {}", status.manufacturer.as_deref().unwrap_or(unknown));
    match status.battery_level {
        Some(level) => println!("battery:      {level}%"),
        None => println!("battery:      {unknown}"),
    }
    println!("calibration:  {:?}", status.calibration);
    println!("devices:");
    for device in &status.devices {
        match device.virtual_of {
            Some((a, b)) => println!("  port {:>3}  {}  (virtual {a}+{b})", device.port, device.name()),
            None => println!("  port {:>3}  {}", device.port, device.name()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
