//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all, via [`Config::default`]) yields the reference settings: sample every
//! 10 s, store WOD every 60 s, roll at 10 KB, give up after 5 file errors.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::{Path, PathBuf};

use crate::agw::protocol::{AGW_CALLSIGN_MAX_LEN, PID_NO_PROTOCOL};
use crate::error::{Result, TelemError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub wod: WodConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Sampling and persistence cadence
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Seconds between sensor reads (0 disables sampling)
    #[serde(default = "default_sample_period_s")]
    pub sample_period_s: u64,

    /// Seconds between WOD appends (0 disables WOD)
    #[serde(default = "default_persist_period_s")]
    pub persist_period_s: u64,

    /// Seconds between time beacons (0 sends only the start-up beacon)
    #[serde(default)]
    pub time_beacon_period_s: u64,

    /// Idle sleep between ticks
    #[serde(default = "default_idle_sleep_ms")]
    pub idle_sleep_ms: u64,
}

/// WOD file configuration
#[derive(Debug, Deserialize, Clone)]
pub struct WodConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Name of the working WOD file inside `data_dir`
    #[serde(default = "default_wod_file_name")]
    pub file_name: String,

    /// Where completed files go; relative paths resolve against `data_dir`
    #[serde(default = "default_completed_dir")]
    pub completed_dir: String,

    #[serde(default = "default_max_file_size_kb")]
    pub max_file_size_kb: f64,

    #[serde(default = "default_max_file_io_errors")]
    pub max_file_io_errors: u32,
}

/// AGW TNC link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    #[serde(default = "default_link_enabled")]
    pub enabled: bool,

    #[serde(default = "default_link_host")]
    pub host: String,

    #[serde(default = "default_link_port")]
    pub port: u16,

    /// TNC radio port the frames are sent on
    #[serde(default)]
    pub radio_port: u8,

    #[serde(default = "default_source_callsign")]
    pub source_callsign: String,

    #[serde(default = "default_time_callsign")]
    pub time_callsign: String,

    #[serde(default = "default_telemetry_callsign")]
    pub telemetry_callsign: String,

    #[serde(default = "default_pid")]
    pub pid: u8,

    /// Capacity of the inbound frame buffer
    #[serde(default = "default_rx_buffer_frames")]
    pub rx_buffer_frames: usize,

    /// Time given to the TNC after connecting, before the first frame
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub verbose: bool,

    /// Optional directory for a daily rolling log file
    #[serde(default)]
    pub directory: Option<String>,
}

// Default value functions
fn default_sample_period_s() -> u64 { 10 }
fn default_persist_period_s() -> u64 { 60 }
fn default_idle_sleep_ms() -> u64 { 100 }

fn default_data_dir() -> String { "/tmp".to_string() }
fn default_wod_file_name() -> String { "wod".to_string() }
fn default_completed_dir() -> String { "queue".to_string() }
fn default_max_file_size_kb() -> f64 { 10.0 }
fn default_max_file_io_errors() -> u32 { 5 }

fn default_link_enabled() -> bool { true }
fn default_link_host() -> String { "127.0.0.1".to_string() }
fn default_link_port() -> u16 { 8000 }
fn default_source_callsign() -> String { "AMSAT-11".to_string() }
fn default_time_callsign() -> String { "TIME-1".to_string() }
fn default_telemetry_callsign() -> String { "TLMP1".to_string() }
fn default_pid() -> u8 { PID_NO_PROTOCOL }
fn default_rx_buffer_frames() -> usize { 64 }
fn default_settle_ms() -> u64 { 3000 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sample_period_s: default_sample_period_s(),
            persist_period_s: default_persist_period_s(),
            time_beacon_period_s: 0,
            idle_sleep_ms: default_idle_sleep_ms(),
        }
    }
}

impl Default for WodConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            file_name: default_wod_file_name(),
            completed_dir: default_completed_dir(),
            max_file_size_kb: default_max_file_size_kb(),
            max_file_io_errors: default_max_file_io_errors(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            enabled: default_link_enabled(),
            host: default_link_host(),
            port: default_link_port(),
            radio_port: 0,
            source_callsign: default_source_callsign(),
            time_callsign: default_time_callsign(),
            telemetry_callsign: default_telemetry_callsign(),
            pid: default_pid(),
            rx_buffer_frames: default_rx_buffer_frames(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl WodConfig {
    /// Path of the working WOD file
    pub fn wod_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.file_name)
    }

    /// Directory completed WOD files are moved into
    pub fn completed_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.completed_dir)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use pacsat_telem::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Called by [`Config::load`]; call it again after applying command line
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.wod.data_dir.is_empty() {
            return Err(invalid("wod data_dir cannot be empty"));
        }

        if self.wod.file_name.is_empty() || self.wod.file_name.contains('/') {
            return Err(invalid("wod file_name must be a plain, non-empty file name"));
        }

        if self.wod.completed_dir.is_empty() {
            return Err(invalid("wod completed_dir cannot be empty"));
        }

        if self.wod.completed_path() == Path::new(&self.wod.data_dir) {
            return Err(invalid("wod completed_dir must differ from data_dir"));
        }

        if !self.wod.max_file_size_kb.is_finite() || self.wod.max_file_size_kb <= 0.0 {
            return Err(invalid("max_file_size_kb must be a positive number"));
        }

        if self.scheduler.idle_sleep_ms > 1000 {
            return Err(invalid("idle_sleep_ms must be between 0 and 1000"));
        }

        if self.link.enabled {
            if self.link.host.is_empty() {
                return Err(invalid("link host cannot be empty when enabled"));
            }

            if self.link.port == 0 {
                return Err(invalid("link port must be greater than 0"));
            }

            if self.link.rx_buffer_frames == 0 {
                return Err(invalid("rx_buffer_frames must be greater than 0"));
            }

            if self.link.settle_ms > 60000 {
                return Err(invalid("settle_ms must be between 0 and 60000"));
            }
        }

        for (name, call) in [
            ("source_callsign", &self.link.source_callsign),
            ("time_callsign", &self.link.time_callsign),
            ("telemetry_callsign", &self.link.telemetry_callsign),
        ] {
            if call.is_empty() || call.len() > AGW_CALLSIGN_MAX_LEN || !call.is_ascii() {
                return Err(invalid(format!(
                    "{} must be 1 to {} ASCII characters",
                    name, AGW_CALLSIGN_MAX_LEN
                )));
            }
        }

        Ok(())
    }
}

fn invalid(msg: impl std::fmt::Display) -> TelemError {
    TelemError::Config(toml::de::Error::custom(msg))
}
