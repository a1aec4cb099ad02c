// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Fan channels and their per-channel control policy.
//!
//! The controller drives four independently actuated fan groups. Three of
//! them follow their own temperature curve; `chassis` is derived from the
//! `cpu` and `pcie` targets.

use crate::error::ChannelParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One independently actuated fan group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Pcie,
    Chassis,
    Cpu,
    Hdd,
}

impl Channel {
    /// All channels, in declaration order.
    pub const ALL: [Channel; 4] = [Channel::Pcie, Channel::Chassis, Channel::Cpu, Channel::Hdd];

    /// Order in which channels are actuated within a cycle. Chassis goes
    /// first since the other groups depend on its airflow.
    pub const ACTUATION_ORDER: [Channel; 4] =
        [Channel::Chassis, Channel::Pcie, Channel::Cpu, Channel::Hdd];

    pub fn name(self) -> &'static str {
        match self {
            Channel::Pcie => "pcie",
            Channel::Chassis => "chassis",
            Channel::Cpu => "cpu",
            Channel::Hdd => "hdd",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Channel {
    type Err = ChannelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pcie" => Ok(Channel::Pcie),
            "chassis" => Ok(Channel::Chassis),
            "cpu" => Ok(Channel::Cpu),
            "hdd" => Ok(Channel::Hdd),
            _ => Err(ChannelParseError {
                name: s.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-channel storage
// ---------------------------------------------------------------------------

/// One value per channel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerChannel<T> {
    pub pcie: T,
    pub chassis: T,
    pub cpu: T,
    pub hdd: T,
}

impl<T> PerChannel<T> {
    pub fn get(&self, channel: Channel) -> &T {
        match channel {
            Channel::Pcie => &self.pcie,
            Channel::Chassis => &self.chassis,
            Channel::Cpu => &self.cpu,
            Channel::Hdd => &self.hdd,
        }
    }

    pub fn get_mut(&mut self, channel: Channel) -> &mut T {
        match channel {
            Channel::Pcie => &mut self.pcie,
            Channel::Chassis => &mut self.chassis,
            Channel::Cpu => &mut self.cpu,
            Channel::Hdd => &mut self.hdd,
        }
    }

    /// Build a value for every channel from a function.
    pub fn from_fn(mut f: impl FnMut(Channel) -> T) -> Self {
        Self {
            pcie: f(Channel::Pcie),
            chassis: f(Channel::Chassis),
            cpu: f(Channel::Cpu),
            hdd: f(Channel::Hdd),
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(Channel, &T) -> U) -> PerChannel<U> {
        PerChannel::from_fn(|ch| f(ch, self.get(ch)))
    }
}

impl<T: fmt::Display> fmt::Display for PerChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pcie={} chassis={} cpu={} hdd={}",
            self.pcie, self.chassis, self.cpu, self.hdd
        )
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Constants governing one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelPolicy {
    /// Minimum percentage regardless of the computed target.
    pub floor: u8,
    /// Raw temperature at or above which the channel is forced to 100%.
    /// `None` for chassis, which has no sensor of its own.
    pub critical_c: Option<f64>,
    /// Largest change in commanded percentage per cycle.
    pub step: u8,
}

impl ChannelPolicy {
    /// Whether a raw reading meets the critical threshold.
    pub fn is_critical(&self, reading: Option<f64>) -> bool {
        match (reading, self.critical_c) {
            (Some(t), Some(crit)) => t >= crit,
            _ => false,
        }
    }
}
