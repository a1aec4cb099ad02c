// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Temperature sources.
//!
//! Each source reads one temperature from the machine, usually by running a
//! vendor tool and parsing its output, and reports the outcome as a
//! [`SensorReading`]. Sources never fail the cycle: a missing tool, a parse
//! error or a timeout is just a reading without a value.
//!
//! Sources:
//! - [`StorcliRoc`]: LSI/Broadcom RAID controller ROC temperature (`storcli`)
//! - [`LmSensors`]: `sensors -j`, either the AMD `k10temp` Tctl or the
//!   hottest `jc42` DIMM sensor, all read from one [`LmSensorsSnapshot`]
//!   per cycle
//! - [`HwmonTemp`]: a labelled `tempN_input` under `/sys/class/hwmon`
//! - [`SmartctlDisk`]: SMART temperature attribute of one SATA disk, the
//!   disks themselves found by [`SataDisks`] via `lsblk`

use crate::error::{SensorError, ToolError};
use crate::tool;
use serde_json::Value;
use std::fmt;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const HWMON_ROOT: &str = "/sys/class/hwmon";

// ---------------------------------------------------------------------------
// Readings and the source trait
// ---------------------------------------------------------------------------

/// Outcome of one read attempt.
#[derive(Debug)]
pub enum SensorReading {
    /// Temperature in degrees Celsius.
    Value(f64),
    /// Nothing to read: tool not installed, device absent, no matching entry.
    Unavailable(String),
    /// The read was attempted and went wrong.
    Failed(SensorError),
}

impl SensorReading {
    pub fn value(&self) -> Option<f64> {
        match self {
            SensorReading::Value(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<Result<Option<f64>, SensorError>> for SensorReading {
    fn from(result: Result<Option<f64>, SensorError>) -> Self {
        match result {
            Ok(Some(v)) => SensorReading::Value(v),
            Ok(None) => SensorReading::Unavailable("no temperature in output".to_string()),
            Err(SensorError::Tool(ToolError::NotFound { tool })) => {
                SensorReading::Unavailable(format!("{tool} not found"))
            }
            Err(e) => SensorReading::Failed(e),
        }
    }
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorReading::Value(v) => write!(f, "{v}"),
            SensorReading::Unavailable(why) => write!(f, "unavailable ({why})"),
            SensorReading::Failed(e) => write!(f, "failed ({e})"),
        }
    }
}

pub type ReadFuture<'a> = Pin<Box<dyn Future<Output = SensorReading> + Send + 'a>>;

/// Something that can produce one temperature within a bounded time.
pub trait TempSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn read(&self) -> ReadFuture<'_>;

    /// Called once per cycle before any source is read.
    fn begin_cycle(&self) {}
}

pub type DiscoverFuture<'a> = Pin<Box<dyn Future<Output = Vec<Box<dyn TempSource>>> + Send + 'a>>;

/// Finds the set of devices to read this cycle. An empty set is normal.
pub trait DeviceDiscovery: Send + Sync {
    fn discover(&self) -> DiscoverFuture<'_>;
}

// ---------------------------------------------------------------------------
// storcli
// ---------------------------------------------------------------------------

/// RAID-on-chip temperature of controller 0.
pub struct StorcliRoc {
    pub timeout: Duration,
}

impl TempSource for StorcliRoc {
    fn name(&self) -> &str {
        "storcli ROC"
    }

    fn read(&self) -> ReadFuture<'_> {
        Box::pin(async move {
            let Some(exe) = tool::which_any(&["storcli64", "storcli"]) else {
                return SensorReading::Unavailable("storcli not found".to_string());
            };
            let result = tool::run(&exe, &["/c0", "show", "temperature"], self.timeout)
                .await
                .map(|out| parse_storcli_roc(&tool::stdout_text(&out)))
                .map_err(SensorError::from);
            result.into()
        })
    }
}

/// Extract the first number following `ROC temperature` on the same line.
pub fn parse_storcli_roc(output: &str) -> Option<f64> {
    output.lines().find_map(|line| {
        let idx = line.find("ROC temperature")?;
        first_integer(&line[idx + "ROC temperature".len()..]).map(|n| n as f64)
    })
}

// ---------------------------------------------------------------------------
// lm-sensors
// ---------------------------------------------------------------------------

/// Which value to pick out of `sensors -j`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmChip {
    /// `k10temp-*` → `Tctl` → `*_input`
    K10tempTctl,
    /// max over `jc42-*` → `temp1` → `*_input`
    Jc42Max,
}

pub struct LmSensors {
    pub chip: LmChip,
    pub snapshot: Arc<LmSensorsSnapshot>,
}

impl TempSource for LmSensors {
    fn name(&self) -> &str {
        match self.chip {
            LmChip::K10tempTctl => "CPU Tctl",
            LmChip::Jc42Max => "JC42 max",
        }
    }

    fn read(&self) -> ReadFuture<'_> {
        Box::pin(async move {
            let result = self.snapshot.json().await.map(|json| match self.chip {
                LmChip::K10tempTctl => parse_k10temp_tctl(&json),
                LmChip::Jc42Max => parse_jc42_max(&json),
            });
            result.into()
        })
    }

    fn begin_cycle(&self) {
        self.snapshot.begin_cycle();
    }
}

/// The output of one `sensors -j` run, shared by every [`LmSensors`] of a
/// cycle. The tool runs at most once per cycle; readers arriving while it
/// runs wait for that run instead of starting another.
pub struct LmSensorsSnapshot {
    program: String,
    timeout: Duration,
    cycle: AtomicU64,
    cached: tokio::sync::Mutex<Option<(u64, Result<Arc<Value>, SensorError>)>>,
}

impl LmSensorsSnapshot {
    pub fn new(timeout: Duration) -> Arc<Self> {
        Self::with_program("sensors", timeout)
    }

    /// `program` is a name on `PATH` or a path.
    pub fn with_program(program: &str, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            program: program.to_string(),
            timeout,
            cycle: AtomicU64::new(0),
            cached: tokio::sync::Mutex::new(None),
        })
    }

    /// Drop whatever the previous cycle fetched.
    pub fn begin_cycle(&self) {
        self.cycle.fetch_add(1, Ordering::SeqCst);
    }

    pub async fn json(&self) -> Result<Arc<Value>, SensorError> {
        let cycle = self.cycle.load(Ordering::SeqCst);
        let mut cached = self.cached.lock().await;
        if let Some((fetched_in, result)) = cached.as_ref() {
            if *fetched_in == cycle {
                return result.clone();
            }
        }
        let result = sensors_json(&self.program, self.timeout).await.map(Arc::new);
        *cached = Some((cycle, result.clone()));
        result
    }
}

async fn sensors_json(program: &str, timeout: Duration) -> Result<Value, SensorError> {
    let out = tool::run_named(program, &["-j"], timeout).await?;
    serde_json::from_slice(&out.stdout).map_err(|e| SensorError::Parse {
        tool: "sensors -j".to_string(),
        reason: e.to_string(),
    })
}

/// CPU control temperature from the first `k10temp` chip.
pub fn parse_k10temp_tctl(json: &Value) -> Option<f64> {
    let chips = json.as_object()?;
    chips
        .iter()
        .filter(|(chip, _)| chip.starts_with("k10temp-"))
        .find_map(|(_, data)| {
            data.get("Tctl")?
                .as_object()?
                .iter()
                .filter(|(k, _)| k.ends_with("_input"))
                .find_map(|(_, v)| number(v))
        })
}

/// Hottest value over all `jc42` chips.
pub fn parse_jc42_max(json: &Value) -> Option<f64> {
    let chips = json.as_object()?;
    chips
        .iter()
        .filter(|(chip, _)| chip.starts_with("jc42-"))
        .filter_map(|(_, data)| data.get("temp1").unwrap_or(data).as_object())
        .flat_map(|section| section.iter())
        .filter(|(k, _)| k.ends_with("_input"))
        .filter_map(|(_, v)| number(v))
        .reduce(f64::max)
}

// ---------------------------------------------------------------------------
// hwmon sysfs
// ---------------------------------------------------------------------------

/// A temperature read straight from sysfs, matched by chip name and label.
pub struct HwmonTemp {
    pub root: PathBuf,
    /// Content of the hwmon `name` file, e.g. `k10temp`.
    pub chip: String,
    /// Content of `tempN_label`, e.g. `Tctl`.
    pub label: String,
    display: String,
}

impl HwmonTemp {
    pub fn new(chip: &str, label: &str) -> Self {
        Self::with_root(HWMON_ROOT, chip, label)
    }

    pub fn with_root(root: impl Into<PathBuf>, chip: &str, label: &str) -> Self {
        Self {
            root: root.into(),
            chip: chip.to_string(),
            label: label.to_string(),
            display: format!("hwmon {chip}/{label}"),
        }
    }

    fn read_sync(&self) -> SensorReading {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => return SensorReading::Unavailable(format!("{}: {e}", self.root.display())),
        };

        for entry in entries.flatten() {
            let hwmon_dir = entry.path();
            if read_trimmed(&hwmon_dir.join("name")).as_deref() != Some(self.chip.as_str()) {
                continue;
            }

            for n in 1..=32 {
                let input_path = hwmon_dir.join(format!("temp{n}_input"));
                if !input_path.exists() {
                    break;
                }
                let label = read_trimmed(&hwmon_dir.join(format!("temp{n}_label")));
                if label.as_deref() != Some(self.label.as_str()) {
                    continue;
                }
                return match read_trimmed(&input_path).map(|s| s.parse::<i64>()) {
                    Some(Ok(millic)) => SensorReading::Value(millic as f64 / 1000.0),
                    Some(Err(e)) => SensorReading::Failed(SensorError::Parse {
                        tool: input_path.display().to_string(),
                        reason: e.to_string(),
                    }),
                    None => SensorReading::Unavailable(format!("{} unreadable", input_path.display())),
                };
            }
        }

        SensorReading::Unavailable(format!("no {} sensor labelled {}", self.chip, self.label))
    }
}

impl TempSource for HwmonTemp {
    fn name(&self) -> &str {
        &self.display
    }

    fn read(&self) -> ReadFuture<'_> {
        Box::pin(async move { self.read_sync() })
    }
}

// ---------------------------------------------------------------------------
// SATA disks
// ---------------------------------------------------------------------------

/// SMART temperature of a single disk.
pub struct SmartctlDisk {
    pub device: String,
    pub timeout: Duration,
}

impl TempSource for SmartctlDisk {
    fn name(&self) -> &str {
        &self.device
    }

    fn read(&self) -> ReadFuture<'_> {
        Box::pin(async move {
            let result = tool::run_named("smartctl", &["-A", &self.device], self.timeout)
                .await
                .map(|out| parse_smartctl_temperature(&tool::stdout_text(&out)))
                .map_err(SensorError::from);
            result.into()
        })
    }
}

/// Highest temperature among the SMART attribute rows and the
/// `Temperature:` / `Current Drive Temperature:` summary lines.
///
/// For attribute rows the RAW_VALUE column is used, so a trailing
/// `(Min/Max 20/45)` does not leak into the result.
pub fn parse_smartctl_temperature(output: &str) -> Option<f64> {
    let mut candidates = Vec::new();

    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let is_attribute_row = tokens.len() >= 10 && tokens[0].parse::<u16>().is_ok();

        if is_attribute_row {
            if tokens[1].to_ascii_lowercase().contains("temperature") {
                if let Some(raw) = first_integer(tokens[9]) {
                    candidates.push(raw);
                }
            }
            continue;
        }

        if let Some((label, value)) = line.split_once(':') {
            let label = label.trim();
            if label.eq_ignore_ascii_case("Temperature")
                || label.eq_ignore_ascii_case("Current Drive Temperature")
            {
                if let Some(v) = first_integer(value) {
                    candidates.push(v);
                }
            }
        }
    }

    candidates.into_iter().max().map(|v| v as f64)
}

/// Enumerates SATA disks with `lsblk`; NVMe and other transports are skipped.
pub struct SataDisks {
    pub timeout: Duration,
}

impl DeviceDiscovery for SataDisks {
    fn discover(&self) -> DiscoverFuture<'_> {
        Box::pin(async move {
            let out = match tool::run_named("lsblk", &["-dn", "-o", "NAME,TRAN"], self.timeout).await {
                Ok(out) => out,
                Err(ToolError::NotFound { .. }) => {
                    log::warn!("lsblk not found");
                    return Vec::new();
                }
                Err(e) => {
                    log::warn!("lsblk failed: {e}");
                    return Vec::new();
                }
            };

            let devices = parse_lsblk_sata(&tool::stdout_text(&out));
            log::info!("SATA disks: {devices:?}");
            devices
                .into_iter()
                .map(|device| {
                    Box::new(SmartctlDisk {
                        device,
                        timeout: self.timeout,
                    }) as Box<dyn TempSource>
                })
                .collect()
        })
    }
}

/// Device paths of the disks whose transport is `sata`.
pub fn parse_lsblk_sata(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?;
            let tran = parts.next()?;
            tran.eq_ignore_ascii_case("sata")
                .then(|| format!("/dev/{name}"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

/// First run of ASCII digits in `s`.
fn first_integer(s: &str) -> Option<i64> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let digits: String = s[start..].chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// A finite number, either a JSON number or a numeric string.
fn number(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|v: &f64| v.is_finite())
}
