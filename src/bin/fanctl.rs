// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! fanctl: samples temperatures, runs the fan curves and drives the BMC.

use anyhow::Context;
use clap::Parser;
use ipmi_fanctl::actuator::{self, IpmiSink};
use ipmi_fanctl::aggregator::SensorAggregator;
use ipmi_fanctl::channel::Channel;
use ipmi_fanctl::config;
use ipmi_fanctl::driver::{self, Controller, RunMode};
use ipmi_fanctl::engine::DecisionEngine;
use ipmi_fanctl::logging::{self, LogOptions};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "fanctl", about = "IPMI fan controller with temperature curves")]
struct Cli {
    /// Seconds between cycles (overrides the config file).
    #[arg(long)]
    interval: Option<u64>,

    /// Curve/config file, TOML or JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log ipmitool commands without running them.
    #[arg(long)]
    dry_run: bool,

    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,

    /// Debug-level logging.
    #[arg(long)]
    verbose: bool,

    /// Also print log lines to stdout.
    #[arg(long)]
    foreground: bool,

    /// Log file path.
    #[arg(long, default_value = logging::DEFAULT_LOG_PATH)]
    log_file: PathBuf,

    /// Rotate the log file at this size.
    #[arg(long, default_value_t = 5)]
    log_max_mb: u64,

    /// Rotated log files to keep.
    #[arg(long, default_value_t = logging::DEFAULT_BACKUPS)]
    log_backups: usize,

    /// Set one fan immediately and exit: FAN in pcie|chassis|cpu|hdd, PCT 0-100.
    #[arg(long, num_args = 2, value_names = ["FAN", "PCT"], allow_negative_numbers = true)]
    set: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&LogOptions {
        path: Some(cli.log_file.clone()),
        max_bytes: cli.log_max_mb.saturating_mul(1024 * 1024),
        backups: cli.log_backups,
        foreground: cli.foreground,
        verbose: cli.verbose,
    })
    .context("Failed to open log file")?;

    if !cli.dry_run && !nix::unistd::geteuid().is_root() {
        log::warn!("not running as root, ipmitool and smartctl will likely fail");
    }

    if let Some(args) = &cli.set {
        return manual_set(args, &cli).await;
    }

    let cfg = match config::load_config(cli.config.as_deref(), &config::default_config_path()) {
        Ok(cfg) => cfg,
        Err(e) => {
            log::error!("load curves failed: {e}");
            return Err(e).context("Failed to load configuration");
        }
    };
    let cfg = match cli.interval {
        Some(secs) => cfg.with_interval_secs(secs),
        None => cfg,
    };
    cfg.log_summary();

    let sink = IpmiSink::new(cfg.tool_timeout, cli.dry_run);
    let mut controller = Controller::new(
        SensorAggregator::system(cfg.tool_timeout),
        DecisionEngine::new(cfg.policy),
        Box::new(sink),
    );

    let mode = if cli.once {
        RunMode::Once
    } else {
        RunMode::Forever {
            interval: cfg.interval,
        }
    };
    controller.run(mode, driver::shutdown_signal()).await;

    log::info!("fanctl exiting");
    Ok(())
}

// ---------------------------------------------------------------------------
// Manual override
// ---------------------------------------------------------------------------

async fn manual_set(args: &[String], cli: &Cli) -> anyhow::Result<()> {
    let [fan, pct] = args else {
        anyhow::bail!("--set takes FAN and PCT");
    };

    let channel: Channel = match fan.parse() {
        Ok(channel) => channel,
        Err(e) => {
            log::error!("{e}");
            return Err(e.into());
        }
    };
    let pct: i64 = pct
        .trim()
        .parse()
        .with_context(|| format!("PCT must be an integer, got '{pct}'"))?;
    let pct = actuator::clamp_percent(pct);

    let sink = IpmiSink::new(ipmi_fanctl::tool::DEFAULT_TOOL_TIMEOUT, cli.dry_run);
    if let Err(e) = driver::set_manual(&sink, channel, pct).await {
        log::warn!("manual set {channel} -> {pct}% failed: {e}");
    }
    Ok(())
}
