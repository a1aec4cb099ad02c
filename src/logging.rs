// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Log output: `env_logger` piped into a size-rotated file, optionally
//! mirrored to stdout.

use nix::unistd::{AccessFlags, access};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Default log file location.
pub const DEFAULT_LOG_PATH: &str = "/var/log/fanctl.log";

/// Used when the default location is not writable.
pub const FALLBACK_LOG_PATH: &str = "./fanctl.log";

pub const DEFAULT_MAX_BYTES: u64 = 5 * 1024 * 1024;

pub const DEFAULT_BACKUPS: usize = 2;

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub path: Option<PathBuf>,
    pub max_bytes: u64,
    /// Rotated files kept besides the current one.
    pub backups: usize,
    /// Mirror to stdout.
    pub foreground: bool,
    pub verbose: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            path: None,
            max_bytes: DEFAULT_MAX_BYTES,
            backups: DEFAULT_BACKUPS,
            foreground: false,
            verbose: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Rotating file
// ---------------------------------------------------------------------------

/// Appends to `path`; once the next write would push it past `max_bytes`
/// the file is shifted to `path.1`, `path.1` to `path.2` and so on, keeping
/// `backups` old files.
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    file: File,
    written: u64,
}

impl RotatingFile {
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            max_bytes,
            backups,
            file,
            written,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.backups == 0 {
            self.file = File::create(&self.path)?;
            self.written = 0;
            return Ok(());
        }

        for n in (1..self.backups).rev() {
            let from = backup_path(&self.path, n);
            if from.exists() {
                fs::rename(&from, backup_path(&self.path, n + 1))?;
            }
        }
        fs::rename(&self.path, backup_path(&self.path, 1))?;
        self.file = open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.max_bytes > 0 && self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// `fanctl.log` → `fanctl.log.<n>`
pub fn backup_path(path: &Path, n: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Writes every record to the log file and, when enabled, stdout.
struct Tee {
    file: RotatingFile,
    stdout: bool,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        if self.stdout {
            io::stdout().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.stdout {
            io::stdout().flush()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

/// Pick the log path: the requested one, or the default; if its directory
/// is not writable fall back to `./fanctl.log`.
pub fn resolve_log_path(requested: Option<&Path>) -> PathBuf {
    let path = requested.unwrap_or(Path::new(DEFAULT_LOG_PATH));
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => return path.to_path_buf(),
    };
    if dir_writable(dir) {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join("fanctl.log"))
            .unwrap_or_else(|_| PathBuf::from(FALLBACK_LOG_PATH))
    }
}

fn dir_writable(dir: &Path) -> bool {
    dir.is_dir() && access(dir, AccessFlags::W_OK).is_ok()
}

/// Install the global logger. Returns the path actually logged to.
pub fn init(opts: &LogOptions) -> io::Result<PathBuf> {
    let path = resolve_log_path(opts.path.as_deref());
    let file = RotatingFile::open(&path, opts.max_bytes, opts.backups)?;
    let level = if opts.verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {} {}",
                buf.timestamp_seconds(),
                record.level(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(Tee {
            file,
            stdout: opts.foreground,
        })))
        .init();

    log::info!("==== fanctl started ====");
    log::info!(
        "log_file={} max_bytes={} backups={} foreground={}",
        path.display(),
        opts.max_bytes,
        opts.backups,
        opts.foreground
    );
    Ok(path)
}
