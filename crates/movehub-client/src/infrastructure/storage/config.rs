//! TOML configuration and saved-hub persistence.
//!
//! The config file lives in the platform config directory:
//! - Linux:   `$XDG_CONFIG_HOME/movehub/config.toml` (or `~/.config/movehub/...`)
//! - macOS:   `~/Library/Application Support/MoveHub/config.toml`
//! - Windows: `%APPDATA%\MoveHub\config.toml`
//!
//! ```toml
//! [hub]
//! address = "90:84:2B:12:34:56"
//! name = "Technic Move"
//!
//! [session]
//! calibration_wait_ms = 2000
//! centering_grace_ms = 500
//!
//! [control]
//! tick_rate_hz = 20
//! speed_step = 20
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Every field has a default, so a missing file or a partial file is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use movehub_core::MappingConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::application::address::{AddressStore, StoreError};
use crate::application::control_loop::ControlLoopConfig;
use crate::application::session::SessionConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but is out of range.
    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub control: ControlSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The hub to connect to when no address is given on the command line.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HubConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Session timing, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    #[serde(default = "default_calibration_wait_ms")]
    pub calibration_wait_ms: u64,
    #[serde(default = "default_centering_grace_ms")]
    pub centering_grace_ms: u64,
    #[serde(default = "default_feedback_timeout_ms")]
    pub feedback_timeout_ms: u64,
    #[serde(default = "default_attach_settle_ms")]
    pub attach_settle_ms: u64,
    /// Ask the hub for name, versions and battery right after connecting.
    #[serde(default = "default_true")]
    pub query_properties: bool,
    /// How long `connect` scans for the saved address before giving up.
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,
}

/// Control loop tick rate and input mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlSection {
    #[serde(default = "default_tick_rate_hz")]
    pub tick_rate_hz: u32,
    #[serde(flatten)]
    pub mapping: MappingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_calibration_wait_ms() -> u64 {
    2000
}
fn default_centering_grace_ms() -> u64 {
    500
}
fn default_feedback_timeout_ms() -> u64 {
    1000
}
fn default_attach_settle_ms() -> u64 {
    300
}
fn default_scan_timeout_ms() -> u64 {
    10_000
}
fn default_true() -> bool {
    true
}
fn default_tick_rate_hz() -> u32 {
    20
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            calibration_wait_ms: default_calibration_wait_ms(),
            centering_grace_ms: default_centering_grace_ms(),
            feedback_timeout_ms: default_feedback_timeout_ms(),
            attach_settle_ms: default_attach_settle_ms(),
            query_properties: default_true(),
            scan_timeout_ms: default_scan_timeout_ms(),
        }
    }
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            tick_rate_hz: default_tick_rate_hz(),
            mapping: MappingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl From<&SessionSection> for SessionConfig {
    fn from(s: &SessionSection) -> Self {
        Self {
            calibration_wait: Duration::from_millis(s.calibration_wait_ms),
            centering_grace: Duration::from_millis(s.centering_grace_ms),
            feedback_timeout: Duration::from_millis(s.feedback_timeout_ms),
            attach_settle: Duration::from_millis(s.attach_settle_ms),
            query_properties: s.query_properties,
        }
    }
}

impl From<&ControlSection> for ControlLoopConfig {
    fn from(c: &ControlSection) -> Self {
        Self {
            tick_rate_hz: c.tick_rate_hz.max(1),
            mapping: c.mapping.clone(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads `AppConfig` from `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// [`ConfigError::Parse`] if the TOML is malformed and
/// [`ConfigError::Invalid`] if a value is out of range.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let config: AppConfig = toml::from_str(&content)?;
            validate(&config)?;
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    let mapping = &config.control.mapping;
    if mapping.steer_limit_degrees <= 0 {
        return Err(ConfigError::Invalid {
            field: "control.steer_limit_degrees",
            reason: format!("must be positive, got {}", mapping.steer_limit_degrees),
        });
    }
    if mapping.speed_step <= 0 {
        return Err(ConfigError::Invalid {
            field: "control.speed_step",
            reason: format!("must be positive, got {}", mapping.speed_step),
        });
    }
    if mapping.steer_step_degrees <= 0 {
        return Err(ConfigError::Invalid {
            field: "control.steer_step_degrees",
            reason: format!("must be positive, got {}", mapping.steer_step_degrees),
        });
    }
    Ok(())
}

/// Writes `config` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("MoveHub"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("MoveHub")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("movehub"))
    }
}

// ── Saved hub address ─────────────────────────────────────────────────────────

/// Stores the address in the `[hub]` section of the config file.
pub struct FileAddressStore {
    path: PathBuf,
    config: AppConfig,
}

impl FileAddressStore {
    /// Wraps an already loaded config that came from `path`.
    pub fn new(path: PathBuf, config: AppConfig) -> Self {
        Self { path, config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

impl AddressStore for FileAddressStore {
    fn get(&self) -> Option<String> {
        self.config.hub.address.clone()
    }

    fn set(&mut self, address: &str, name: Option<String>) -> Result<(), StoreError> {
        self.config.hub.address = Some(address.to_string());
        self.config.hub.name = name;
        save_config(&self.path, &self.config).map_err(|e| StoreError(Box::new(e)))?;
        info!(address, path = %self.path.display(), "saved hub address");
        Ok(())
    }
}

/// Process-local store, for tests and for runs without a config file.
#[derive(Debug, Default, Clone)]
pub struct MemoryAddressStore {
    pub address: Option<String>,
    pub name: Option<String>,
}

impl AddressStore for MemoryAddressStore {
    fn get(&self) -> Option<String> {
        self.address.clone()
    }

    fn set(&mut self, address: &str, name: Option<String>) -> Result<(), StoreError> {
        self.address = Some(address.to_string());
        self.name = name;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("movehub-test-{}-{tag}", std::process::id()))
            .join("config.toml")
    }

    #[test]
    fn test_defaults_match_documented_timings() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.session.calibration_wait_ms, 2000);
        assert_eq!(cfg.session.centering_grace_ms, 500);
        assert_eq!(cfg.session.feedback_timeout_ms, 1000);
        assert_eq!(cfg.session.attach_settle_ms, 300);
        assert_eq!(cfg.control.tick_rate_hz, 20);
        assert_eq!(cfg.control.mapping.stick_deadzone, 15);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.hub.address.is_none());
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [hub]
            address = "AA:BB:CC:DD:EE:FF"

            [control]
            speed_step = 10
            "#,
        )
        .expect("parse");

        assert_eq!(cfg.hub.address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(cfg.control.mapping.speed_step, 10);
        assert_eq!(cfg.control.mapping.steer_step_degrees, 15);
        assert_eq!(cfg.control.tick_rate_hz, 20);
        assert_eq!(cfg.session.calibration_wait_ms, 2000);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut cfg = AppConfig::default();
        cfg.hub.name = Some("Technic Move".into());
        cfg.session.centering_grace_ms = 750;

        let text = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: AppConfig = toml::from_str(&text).expect("deserialize");

        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_session_section_converts_to_durations() {
        let section = SessionSection {
            calibration_wait_ms: 1500,
            ..SessionSection::default()
        };
        let cfg = SessionConfig::from(&section);
        assert_eq!(cfg.calibration_wait, Duration::from_millis(1500));
        assert_eq!(cfg.centering_grace, Duration::from_millis(500));
    }

    #[test]
    fn test_zero_tick_rate_is_raised_to_one() {
        let section = ControlSection {
            tick_rate_hz: 0,
            ..ControlSection::default()
        };
        assert_eq!(ControlLoopConfig::from(&section).tick_rate_hz, 1);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let cfg = load_config(&temp_path("missing")).expect("load");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_file_store_persists_address() {
        // Arrange
        let path = temp_path("store");
        let mut store = FileAddressStore::new(path.clone(), AppConfig::default());

        // Act
        store
            .set("11:22:33:44:55:66", Some("Move Hub".into()))
            .expect("save");

        // Assert
        let reloaded = load_config(&path).expect("reload");
        assert_eq!(reloaded.hub.address.as_deref(), Some("11:22:33:44:55:66"));
        assert_eq!(reloaded.hub.name.as_deref(), Some("Move Hub"));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_negative_steer_limit_is_rejected_on_load() {
        // Arrange
        let path = temp_path("steer-limit");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[control]\nsteer_limit_degrees = -10\n").unwrap();

        // Act
        let result = load_config(&path);

        // Assert
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "control.steer_limit_degrees",
                ..
            })
        ));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryAddressStore::default();
        assert_eq!(store.get(), None);
        store.set("AA", None).unwrap();
        assert_eq!(store.get().as_deref(), Some("AA"));
    }
}
