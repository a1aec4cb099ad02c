// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Fan actuation over IPMI.
//!
//! Each channel maps to a fixed `ipmitool raw` command whose last byte is
//! the duty in percent, `0x00`-`0x64`:
//!
//! ```text
//! ipmitool raw 0x2e 0x44 0xfd 0x19 0x00 <IDX> 0x01 0xNN
//! ```

use crate::channel::Channel;
use crate::error::ActuationError;
use crate::tool;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const IPMITOOL: &str = "ipmitool";

/// Fixed raw-command bytes per channel, everything but the duty byte.
pub fn command_prefix(channel: Channel) -> [&'static str; 7] {
    let zone = match channel {
        Channel::Cpu => "0x00",
        Channel::Chassis => "0x02",
        Channel::Hdd => "0x03",
        Channel::Pcie => "0x04",
    };
    ["0x2e", "0x44", "0xfd", "0x19", "0x00", zone, "0x01"]
}

/// Arguments to `ipmitool` for setting `channel` to `pct` percent.
pub fn ipmi_args(channel: Channel, pct: u8) -> Vec<String> {
    let mut args = Vec::with_capacity(9);
    args.push("raw".to_string());
    args.extend(command_prefix(channel).iter().map(|b| b.to_string()));
    args.push(format!("0x{:02x}", pct.min(100)));
    args
}

/// Clamp an arbitrary requested percentage into 0-100.
pub fn clamp_percent(pct: i64) -> u8 {
    pct.clamp(0, 100) as u8
}

pub type SetFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ActuationError>> + Send + 'a>>;

/// Something that turns a channel percentage into a physical fan speed.
pub trait FanSink: Send + Sync {
    fn set(&self, channel: Channel, pct: u8) -> SetFuture<'_>;
}

/// Drives the BMC through `ipmitool raw`.
pub struct IpmiSink {
    /// `ipmitool`, or another name on `PATH`, or a path.
    pub program: String,
    pub timeout: Duration,
    /// Log the command without running it.
    pub dry_run: bool,
}

impl IpmiSink {
    pub fn new(timeout: Duration, dry_run: bool) -> Self {
        Self {
            program: IPMITOOL.to_string(),
            timeout,
            dry_run,
        }
    }
}

impl FanSink for IpmiSink {
    fn set(&self, channel: Channel, pct: u8) -> SetFuture<'_> {
        Box::pin(async move {
            let pct = pct.min(100);
            let program = self.program.as_str();
            let args = ipmi_args(channel, pct);
            log::info!("SET {channel} -> {pct}% ({program} {})", args.join(" "));

            if self.dry_run {
                log::info!("[DRY-RUN] skip {program} for {channel}");
                return Ok(());
            }

            let argv: Vec<&str> = args.iter().map(String::as_str).collect();
            let output = tool::run_named(program, &argv, self.timeout).await?;
            let stdout = tool::stdout_text(&output).trim().to_string();

            if !output.status.success() {
                return Err(ActuationError::Exit {
                    tool: program.to_string(),
                    status: output.status.to_string(),
                    stdout,
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }

            log::info!("{program} {channel} -> {pct}% ok: {stdout}");
            Ok(())
        })
    }
}
