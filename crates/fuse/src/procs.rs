// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! Host process-table inspection over `/proc`.
//!
//! Used for two advisory features: detecting that a `create` came from a
//! touch-family tool working inside the mount, and listing processes that
//! would block an unmount. Both are best-effort; unreadable entries are
//! skipped.

use std::path::{Path, PathBuf};

const TOUCH_COMMANDS: [&str; 2] = ["touch", "touchfs"];

#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: i32,
    pub name: String,
    pub cwd: Option<PathBuf>,
}

fn read_processes() -> Vec<ProcessInfo> {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Ok(pid) = file_name.to_string_lossy().parse::<i32>() else {
            continue;
        };
        let base = entry.path();
        let Ok(name) = std::fs::read_to_string(base.join("comm")) else {
            continue;
        };
        let cwd = std::fs::read_link(base.join("cwd")).ok();
        out.push(ProcessInfo {
            pid,
            name: name.trim().to_string(),
            cwd,
        });
    }
    out
}

fn is_under(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Working directory of a touch-family process currently inside the mount,
/// if one exists. Advisory: a racing touch may be gone by the time the
/// kernel delivers the create.
pub fn touch_cwd_under(mount_point: &Path) -> Option<PathBuf> {
    read_processes()
        .into_iter()
        .filter(|p| TOUCH_COMMANDS.contains(&p.name.as_str()))
        .filter_map(|p| p.cwd)
        .find(|cwd| is_under(cwd, mount_point))
}

/// Processes whose cwd or open files live under `root`. Excludes the caller
/// so a `touchfs umount` run from outside the mount never reports itself.
pub fn processes_using(root: &Path) -> Vec<ProcessInfo> {
    let own_pid = std::process::id() as i32;
    let mut out = Vec::new();
    for proc in read_processes() {
        if proc.pid == own_pid {
            continue;
        }
        let in_cwd = proc
            .cwd
            .as_deref()
            .map(|cwd| is_under(cwd, root))
            .unwrap_or(false);
        if in_cwd || has_open_file_under(proc.pid, root) {
            out.push(proc);
        }
    }
    out
}

fn has_open_file_under(pid: i32, root: &Path) -> bool {
    let fd_dir = PathBuf::from(format!("/proc/{pid}/fd"));
    let Ok(entries) = std::fs::read_dir(fd_dir) else {
        return false;
    };
    entries
        .flatten()
        .filter_map(|e| std::fs::read_link(e.path()).ok())
        .any(|target| is_under(&target, root))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_uses_a_fresh_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(processes_using(dir.path()).is_empty());
        assert!(touch_cwd_under(dir.path()).is_none());
    }

    #[test]
    fn process_scan_sees_this_process() {
        let own_pid = std::process::id() as i32;
        assert!(read_processes().iter().any(|p| p.pid == own_pid));
    }
}
