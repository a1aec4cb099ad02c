// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Error types for configuration, sampling and actuation.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating configuration. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("curve '{0}' missing")]
    MissingCurve(&'static str),

    #[error("curve '{name}' is invalid: {reason}")]
    InvalidCurve { name: String, reason: String },

    #[error("Invalid setting {what}: {reason}")]
    InvalidSetting { what: &'static str, reason: String },
}

/// Failure to run an external tool to completion.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("{tool} not found in PATH")]
    NotFound { tool: String },

    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("{tool} timed out after {timeout:?}")]
    Timeout { tool: String, timeout: Duration },
}

/// Why a single sensor read produced no value.
#[derive(Debug, Clone, Error)]
pub enum SensorError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("failed to parse {tool} output: {reason}")]
    Parse { tool: String, reason: String },
}

/// A failed actuation attempt. Logged, never fatal.
#[derive(Debug, Error)]
pub enum ActuationError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("{tool} exited with {status}: {stdout} | {stderr}")]
    Exit {
        tool: String,
        status: String,
        stdout: String,
        stderr: String,
    },
}

/// An unknown channel name was supplied.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("unknown fan '{name}', must be one of: pcie, chassis, cpu, hdd")]
pub struct ChannelParseError {
    pub name: String,
}
