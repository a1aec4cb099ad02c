// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Running external tools with a bounded timeout.

use crate::error::ToolError;
use std::env;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Default time budget for one external tool invocation.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(8);

/// Locate an executable by name on `PATH`.
pub fn which(name: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

/// The first of `names` found on `PATH`.
pub fn which_any(names: &[&str]) -> Option<PathBuf> {
    names.iter().find_map(|name| which(name))
}

/// Run `program` with `args`, killing it if it outlives `timeout`.
///
/// The exit status is not inspected; callers decide what a non-zero exit
/// means for them.
pub async fn run(program: &Path, args: &[&str], timeout: Duration) -> Result<Output, ToolError> {
    let tool = program.display().to_string();
    log::debug!("exec: {tool} {}", args.join(" "));

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(ToolError::Spawn {
            tool,
            source: Arc::new(e),
        }),
        Err(_) => Err(ToolError::Timeout { tool, timeout }),
    }
}

/// A bare name is looked up on `PATH`; anything with a `/` is taken as a
/// path as-is.
pub fn resolve(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let path = PathBuf::from(program);
        is_executable(&path).then_some(path)
    } else {
        which(program)
    }
}

/// Resolve `name` and run it.
pub async fn run_named(name: &str, args: &[&str], timeout: Duration) -> Result<Output, ToolError> {
    let program = resolve(name).ok_or_else(|| ToolError::NotFound {
        tool: name.to_string(),
    })?;
    run(&program, args, timeout).await
}

/// Lossy UTF-8 stdout.
pub fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
