// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Closed-loop fan control for IPMI servers.
//!
//! Temperatures are sampled from vendor tools, mapped through per-channel
//! curves, passed through safety overrides and rate-limited smoothing, and
//! issued to the BMC as raw IPMI fan commands.

pub mod actuator;
pub mod aggregator;
pub mod channel;
pub mod config;
pub mod curve;
pub mod driver;
pub mod engine;
pub mod error;
pub mod logging;
pub mod sensors;
pub mod tool;
