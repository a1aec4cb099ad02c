// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Configuration file handling.
//!
//! The file carries the three sensor-driven curves as lists of
//! `[temperature, percentage]` pairs, plus optional tables overriding the
//! built-in policy constants. TOML by default, JSON when the file name ends
//! in `.json`. Default path: `/etc/fanctl/config.toml`
//!
//! ```toml
//! pcie = [[40, 20], [65, 50], [75, 80], [80, 100]]
//! cpu  = [[40, 15], [55, 40], [70, 70], [80, 100]]
//!
//! [control]
//! interval_secs = 5
//! chassis_soft_cap = 50
//!
//! [floors]
//! hdd = 25
//! ```

use crate::channel::{ChannelPolicy, PerChannel};
use crate::curve::{self, CurveSet, FanCurve};
use crate::driver;
use crate::engine::{self, Policy};
use crate::error::ConfigError;
use crate::tool::DEFAULT_TOOL_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/fanctl/config.toml";

/// Default poll interval in seconds.
pub const DEFAULT_INTERVAL_SECS: u64 = 5;

// ---------------------------------------------------------------------------
// File types
// ---------------------------------------------------------------------------

/// The configuration file as written on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Required.
    pub pcie: Option<FanCurve>,
    /// Required.
    pub cpu: Option<FanCurve>,
    /// Falls back to the built-in HDD curve.
    pub hdd: Option<FanCurve>,

    #[serde(default)]
    pub control: ControlConfig,

    #[serde(default)]
    pub floors: FloorConfig,

    #[serde(default)]
    pub critical: CriticalConfig,
}

/// Loop and chassis-derivation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlConfig {
    /// Sleep between cycles in run-forever mode.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Largest per-cycle change of any channel, in percent.
    #[serde(default = "default_smooth_step")]
    pub smooth_step: u8,

    /// Added to max(cpu, pcie) to get the chassis target.
    #[serde(default = "default_chassis_boost")]
    pub chassis_boost: f64,

    /// Chassis ceiling outside critical conditions.
    #[serde(default = "default_chassis_soft_cap")]
    pub chassis_soft_cap: f64,

    /// Time budget for each external tool invocation.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            smooth_step: engine::DEFAULT_SMOOTH_STEP,
            chassis_boost: engine::DEFAULT_CHASSIS_BOOST,
            chassis_soft_cap: engine::DEFAULT_CHASSIS_SOFT_CAP,
            tool_timeout_secs: DEFAULT_TOOL_TIMEOUT.as_secs(),
        }
    }
}

/// Minimum percentage per channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FloorConfig {
    pub pcie: u8,
    pub chassis: u8,
    pub cpu: u8,
    pub hdd: u8,
}

impl Default for FloorConfig {
    fn default() -> Self {
        let defaults = engine::default_channel_policies();
        Self {
            pcie: defaults.pcie.floor,
            chassis: defaults.chassis.floor,
            cpu: defaults.cpu.floor,
            hdd: defaults.hdd.floor,
        }
    }
}

/// Raw temperatures that force a channel to 100%.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CriticalConfig {
    pub pcie: f64,
    pub cpu: f64,
    pub hdd: f64,
}

impl Default for CriticalConfig {
    fn default() -> Self {
        Self {
            pcie: 85.0,
            cpu: 85.0,
            hdd: 57.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Validated settings the controller runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub policy: Policy,
    pub interval: Duration,
    pub tool_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policy: Policy::default(),
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

impl TryFrom<ConfigFile> for Config {
    type Error = ConfigError;

    fn try_from(file: ConfigFile) -> Result<Self, Self::Error> {
        let pcie = file.pcie.ok_or(ConfigError::MissingCurve("pcie"))?;
        let cpu = file.cpu.ok_or(ConfigError::MissingCurve("cpu"))?;
        let hdd = file.hdd.unwrap_or_else(curve::default_hdd_curve);
        let curves = CurveSet { pcie, cpu, hdd };
        for (name, curve) in [("pcie", &curves.pcie), ("cpu", &curves.cpu), ("hdd", &curves.hdd)] {
            curve.validate().map_err(|reason| ConfigError::InvalidCurve {
                name: name.to_string(),
                reason,
            })?;
        }

        let control = file.control;
        if control.smooth_step == 0 {
            return Err(invalid("control.smooth_step", "must be at least 1"));
        }
        if !(0.0..100.0).contains(&control.chassis_soft_cap) {
            return Err(invalid("control.chassis_soft_cap", "must be at least 0 and below 100"));
        }
        if !control.chassis_boost.is_finite() {
            return Err(invalid("control.chassis_boost", "must be a finite number"));
        }
        if control.tool_timeout_secs == 0 {
            return Err(invalid("control.tool_timeout_secs", "must be at least 1"));
        }

        let floors = file.floors;
        for (what, floor) in [
            ("floors.pcie", floors.pcie),
            ("floors.chassis", floors.chassis),
            ("floors.cpu", floors.cpu),
            ("floors.hdd", floors.hdd),
        ] {
            if floor > 100 {
                return Err(invalid(what, "must be within 0-100"));
            }
        }

        let critical = file.critical;
        for (what, temp) in [
            ("critical.pcie", critical.pcie),
            ("critical.cpu", critical.cpu),
            ("critical.hdd", critical.hdd),
        ] {
            if !temp.is_finite() {
                return Err(invalid(what, "must be a finite number"));
            }
        }

        let policy = |floor, critical_c| ChannelPolicy {
            floor,
            critical_c,
            step: control.smooth_step,
        };
        let channels = PerChannel {
            pcie: policy(floors.pcie, Some(critical.pcie)),
            chassis: policy(floors.chassis, None),
            cpu: policy(floors.cpu, Some(critical.cpu)),
            hdd: policy(floors.hdd, Some(critical.hdd)),
        };

        Ok(Config {
            policy: Policy {
                curves,
                channels,
                chassis_boost: control.chassis_boost,
                chassis_soft_cap: control.chassis_soft_cap,
            },
            interval: clamp_interval(control.interval_secs),
            tool_timeout: Duration::from_secs(control.tool_timeout_secs),
        })
    }
}

impl Config {
    /// Replace the poll interval, e.g. from the command line.
    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval = clamp_interval(secs);
        self
    }

    /// Log the effective settings once at startup.
    pub fn log_summary(&self) {
        let p = &self.policy;
        for (name, curve) in [("pcie", &p.curves.pcie), ("cpu", &p.curves.cpu), ("hdd", &p.curves.hdd)] {
            let points: Vec<(f64, f64)> = curve.points().iter().map(|&pt| pt.into()).collect();
            log::info!("curve {name}: {points:?}");
        }
        log::info!(
            "min={} boost_chassis={} soft_cap={} step={}",
            p.channels.map(|_, c| c.floor),
            p.chassis_boost,
            p.chassis_soft_cap,
            p.channels.cpu.step
        );
        log::info!(
            "critical: pcie={:?} cpu={:?} hdd={:?}",
            p.channels.pcie.critical_c,
            p.channels.cpu.critical_c,
            p.channels.hdd.critical_c
        );
        log::info!(
            "interval={}s tool_timeout={}s",
            self.interval.as_secs(),
            self.tool_timeout.as_secs()
        );
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Parse a config file, choosing JSON or TOML by extension.
pub fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let parsed = if is_json {
        serde_json::from_str::<ConfigFile>(&contents).map_err(|e| e.to_string())
    } else {
        toml::from_str::<ConfigFile>(&contents).map_err(|e| e.to_string())
    };

    let file = parsed.map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })?;
    log::info!("Loaded config from {}", path.display());
    Ok(file)
}

/// Load and validate the configuration.
///
/// An explicit path must exist. Without one, `default_path` is used if it
/// exists and the built-in defaults otherwise.
pub fn load_config(cli_path: Option<&Path>, default_path: &Path) -> Result<Config, ConfigError> {
    let path = match cli_path {
        Some(p) => p,
        None if default_path.exists() => default_path,
        None => {
            log::info!("No config file at {}, using defaults", default_path.display());
            return Ok(Config::default());
        }
    };
    Config::try_from(load_config_file(path)?)
}

/// Resolve the default config path.
pub fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn clamp_interval(secs: u64) -> Duration {
    let interval = Duration::from_secs(secs);
    if interval < driver::MIN_INTERVAL {
        log::warn!("interval {secs}s too short, using {:?}", driver::MIN_INTERVAL);
    }
    interval.max(driver::MIN_INTERVAL)
}

fn invalid(what: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidSetting {
        what,
        reason: reason.to_string(),
    }
}

fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_smooth_step() -> u8 {
    engine::DEFAULT_SMOOTH_STEP
}

fn default_chassis_boost() -> f64 {
    engine::DEFAULT_CHASSIS_BOOST
}

fn default_chassis_soft_cap() -> f64 {
    engine::DEFAULT_CHASSIS_SOFT_CAP
}

fn default_tool_timeout_secs() -> u64 {
    DEFAULT_TOOL_TIMEOUT.as_secs()
}
