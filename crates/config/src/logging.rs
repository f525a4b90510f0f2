// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! Logging setup.
//!
//! The mount daemon logs to a plain-text file rotated once per invocation
//! (`touchfs.log`, `touchfs.log.1`, ...). CLI commands log to stderr in
//! either human or jsonl form. `TOUCHFS_TEST_TAG` is injected into every
//! line of the mount log when set.

use anyhow::{bail, Context, Result};
use etcetera::{choose_base_strategy, BaseStrategy};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

pub const LOG_FILE_NAME: &str = "touchfs.log";
const SYSTEM_LOG_DIR: &str = "/var/log/touchfs";

fn active_log_cell() -> &'static RwLock<Option<PathBuf>> {
    static CELL: OnceLock<RwLock<Option<PathBuf>>> = OnceLock::new();
    CELL.get_or_init(|| RwLock::new(None))
}

/// Path of the log file the current process writes to, once mount logging is
/// initialized. The `/.touchfs/log` symlink targets this.
pub fn active_log_path() -> Option<PathBuf> {
    active_log_cell().read().expect("log lock poisoned").clone()
}

/// Preferred log directory: the system location when usable, otherwise the
/// user's state directory.
pub fn log_dir() -> Result<PathBuf> {
    let system = PathBuf::from(SYSTEM_LOG_DIR);
    if std::fs::create_dir_all(&system).is_ok() {
        let probe = system.join(".write-probe");
        if std::fs::write(&probe, b"ok").is_ok() {
            let _ = std::fs::remove_file(&probe);
            return Ok(system);
        }
    }

    let base = choose_base_strategy().context("unable to resolve home directory")?;
    let state_home = std::env::var_os("XDG_STATE_HOME")
        .map(PathBuf::from)
        .or_else(|| base.state_dir())
        .unwrap_or_else(|| base.home_dir().join(".local").join("state"));
    let dir = state_home.join("touchfs");
    std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

/// Shift an existing `touchfs.log` aside with the next free numeric suffix.
pub fn rotate_logs(dir: &Path) -> Result<()> {
    let current = dir.join(LOG_FILE_NAME);
    if !current.exists() {
        return Ok(());
    }
    let mut next = 1u32;
    for entry in std::fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(suffix) = name.strip_prefix("touchfs.log.") {
            if let Ok(n) = suffix.parse::<u32>() {
                next = next.max(n + 1);
            }
        }
    }
    let rotated = dir.join(format!("{LOG_FILE_NAME}.{next}"));
    std::fs::rename(&current, &rotated)
        .with_context(|| format!("rotate {} -> {}", current.display(), rotated.display()))?;
    Ok(())
}

/// File writer shared by all subscriber threads. Prefixes the optional test
/// tag and optionally tees to stderr for foreground runs.
#[derive(Clone)]
struct LogWriter {
    file: Arc<Mutex<std::fs::File>>,
    tag: Option<Arc<str>>,
    tee_stderr: bool,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self.file.lock().expect("log writer poisoned");
        if let Some(tag) = &self.tag {
            file.write_all(b"[")?;
            file.write_all(tag.as_bytes())?;
            file.write_all(b"] ")?;
        }
        file.write_all(buf)?;
        if self.tee_stderr {
            let _ = io::stderr().write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().expect("log writer poisoned").flush()
    }
}

/// Rotate and open the mount log, then install the global subscriber.
/// Returns the active log path.
pub fn init_mount_logging(foreground: bool) -> Result<PathBuf> {
    let dir = log_dir()?;
    rotate_logs(&dir)?;
    let path = dir.join(LOG_FILE_NAME);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {}", path.display()))?;

    let writer = LogWriter {
        file: Arc::new(Mutex::new(file)),
        tag: crate::settings::test_tag().map(Arc::from),
        tee_stderr: foreground,
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .init();

    *active_log_cell().write().expect("log lock poisoned") = Some(path.clone());
    tracing::info!(path = %path.display(), "logging_initialized");
    Ok(path)
}

/// Stderr logging for short-lived CLI commands.
pub fn init_cli_logging(format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    match format {
        "human" => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
        "jsonl" => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .json()
                .with_current_span(true)
                .init();
        }
        other => bail!("invalid --log-format '{other}' (expected human|jsonl)"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_uses_next_free_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOG_FILE_NAME), b"current").unwrap();
        std::fs::write(dir.path().join("touchfs.log.1"), b"old").unwrap();
        std::fs::write(dir.path().join("touchfs.log.3"), b"older").unwrap();

        rotate_logs(dir.path()).unwrap();

        assert!(!dir.path().join(LOG_FILE_NAME).exists());
        let rotated = dir.path().join("touchfs.log.4");
        assert_eq!(std::fs::read(rotated).unwrap(), b"current");
    }

    #[test]
    fn rotation_without_existing_log_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        rotate_logs(dir.path()).unwrap();
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
