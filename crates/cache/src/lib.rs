// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! Content-addressable cache for backend requests.
//!
//! One file per entry, named `<sha256>.json`, holding
//! `{"request": ..., "response": ...}`. Keys are the SHA-256 of the
//! canonical JSON encoding of the request (keys sorted). The cache is
//! strictly an optimization: every failure path degrades to a miss and is
//! only logged, never surfaced.

pub mod stats;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use etcetera::{choose_base_strategy, BaseStrategy};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, warn};

pub const ENV_CACHE_FOLDER: &str = "TOUCHFS_CACHE_FOLDER";

/// `TOUCHFS_CACHE_FOLDER` override, else `~/.touchfs.cache`.
pub fn cache_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(ENV_CACHE_FOLDER) {
        return PathBuf::from(dir);
    }
    match choose_base_strategy() {
        Ok(base) => base.home_dir().join(".touchfs.cache"),
        Err(_) => PathBuf::from(".touchfs.cache"),
    }
}

/// Canonical JSON: object keys sorted, no insignificant whitespace.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String> {
    // serde_json maps are key-sorted; round-tripping through Value sorts
    // struct fields too.
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&value)?)
}

/// Lowercase hex SHA-256 over the canonical encoding of a request.
pub fn request_hash<T: Serialize>(request: &T) -> Result<String> {
    let canonical = canonical_json(request)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Cached response for `request`, if present. Counts a hit or a miss.
pub fn get(request: &serde_json::Value) -> Option<serde_json::Value> {
    if !stats::enabled() {
        stats::increment_misses();
        return None;
    }
    let hash = match request_hash(request) {
        Ok(h) => h,
        Err(e) => {
            warn!(error = %e, "cache_hash_failed");
            stats::increment_misses();
            return None;
        }
    };
    let path = cache_dir().join(format!("{hash}.json"));
    let body = match std::fs::read_to_string(&path) {
        Ok(b) => b,
        Err(_) => {
            stats::increment_misses();
            return None;
        }
    };
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(entry) => match entry.get("response") {
            Some(response) => {
                debug!(key = %hash, "cache_hit");
                stats::increment_hits();
                Some(response.clone())
            }
            None => {
                warn!(key = %hash, "cache_entry_missing_response");
                stats::increment_misses();
                None
            }
        },
        Err(e) => {
            warn!(key = %hash, error = %e, "cache_entry_unreadable");
            stats::increment_misses();
            None
        }
    }
}

/// Store a response. Atomic (temp file, fsync, rename); no-op when disabled.
pub fn put(request: &serde_json::Value, response: &serde_json::Value) {
    if !stats::enabled() {
        return;
    }
    if let Err(e) = try_put(request, response) {
        warn!(error = %e, "cache_write_failed");
    }
}

fn try_put(request: &serde_json::Value, response: &serde_json::Value) -> Result<()> {
    let dir = cache_dir();
    std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let hash = request_hash(request)?;
    let entry = serde_json::json!({ "request": request, "response": response });
    let body = serde_json::to_string_pretty(&entry)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).context("create cache temp file")?;
    tmp.write_all(body.as_bytes())?;
    tmp.as_file().sync_all()?;
    let path = dir.join(format!("{hash}.json"));
    tmp.persist(&path)
        .with_context(|| format!("persist {}", path.display()))?;
    debug!(key = %hash, "cache_stored");
    Ok(())
}

/// Delete every entry.
pub fn clear() {
    let dir = cache_dir();
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "cache_delete_failed");
            }
        }
    }
    debug!("cache_cleared");
}

/// One line of `cache_list` output, pre-formatting.
#[derive(Debug, Clone)]
pub struct EntrySummary {
    pub short_key: String,
    pub created: DateTime<Utc>,
    pub label: String,
    pub response_size: u64,
}

/// Most recent entries, newest first.
pub fn list(limit: usize) -> Vec<EntrySummary> {
    let dir = cache_dir();
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };

    let mut files: Vec<(PathBuf, DateTime<Utc>)> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            if let Some(created) = file_created(&path) {
                files.push((path, created));
            }
        }
    }
    files.sort_by(|a, b| b.1.cmp(&a.1));
    files.truncate(limit);

    files
        .into_iter()
        .map(|(path, created)| summarize(&path, created))
        .collect()
}

fn file_created(path: &std::path::Path) -> Option<DateTime<Utc>> {
    let meta = std::fs::metadata(path).ok()?;
    let ts = meta.created().or_else(|_| meta.modified()).ok()?;
    Some(DateTime::<Utc>::from(ts))
}

fn summarize(path: &std::path::Path, created: DateTime<Utc>) -> EntrySummary {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let short_key = stem.chars().take(8).collect::<String>();

    let parsed = std::fs::read_to_string(path)
        .ok()
        .and_then(|b| serde_json::from_str::<serde_json::Value>(&b).ok());

    let (label, response_size) = match parsed {
        Some(entry) => {
            let request = entry.get("request").cloned().unwrap_or_default();
            let is_seed = request
                .get("type")
                .and_then(|t| t.as_str())
                .map(|t| t.starts_with("filesystem"))
                .unwrap_or(false);
            let prompt = request.get("prompt").and_then(|p| p.as_str());
            let req_path = request.get("path").and_then(|p| p.as_str());
            let label = match (is_seed, prompt, req_path) {
                (true, Some(p), _) => p.to_string(),
                (_, _, Some(p)) => p.to_string(),
                (_, Some(p), _) => p.to_string(),
                _ => "<invalid>".to_string(),
            };
            let size = entry
                .get("response")
                .map(|r| serde_json::to_string(r).map(|s| s.len() as u64).unwrap_or(0))
                .unwrap_or_else(|| {
                    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
                });
            (label, size)
        }
        None => (
            "<error>".to_string(),
            std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
        ),
    };

    EntrySummary {
        short_key,
        created,
        label,
        response_size,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size_bytes: u64,
    pub enabled: bool,
}

pub fn cache_stats() -> CacheStats {
    CacheStats {
        hits: stats::hits(),
        misses: stats::misses(),
        size_bytes: total_size(),
        enabled: stats::enabled(),
    }
}

/// Sum of encoded response sizes across entries; unreadable entries count
/// their file size.
fn total_size() -> u64 {
    let dir = cache_dir();
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return 0;
    };
    let mut total = 0u64;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.extension().map(|e| e == "json").unwrap_or(false) {
            continue;
        }
        let encoded = std::fs::read_to_string(&path)
            .ok()
            .and_then(|b| serde_json::from_str::<serde_json::Value>(&b).ok())
            .and_then(|v| v.get("response").map(|r| serde_json::to_string(r).ok()))
            .flatten()
            .map(|s| s.len() as u64);
        total += encoded.unwrap_or_else(|| std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0));
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Mutex, OnceLock};

    // Tests share the TOUCHFS_CACHE_FOLDER env var; serialize them.
    fn env_guard() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    struct CacheFixture {
        _dir: tempfile::TempDir,
        prev: Option<std::ffi::OsString>,
    }

    impl CacheFixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let prev = std::env::var_os(ENV_CACHE_FOLDER);
            std::env::set_var(ENV_CACHE_FOLDER, dir.path());
            stats::set_enabled(true);
            stats::reset();
            CacheFixture { _dir: dir, prev }
        }
    }

    impl Drop for CacheFixture {
        fn drop(&mut self) {
            match self.prev.take() {
                Some(v) => std::env::set_var(ENV_CACHE_FOLDER, v),
                None => std::env::remove_var(ENV_CACHE_FOLDER),
            }
        }
    }

    #[test]
    fn put_then_get_roundtrips() {
        let _guard = env_guard();
        let _fixture = CacheFixture::new();
        let request = json!({"type": "file_content", "path": "/a.txt"});
        let response = json!({"content": "hello"});

        assert!(get(&request).is_none());
        put(&request, &response);
        assert_eq!(get(&request), Some(response));
        assert_eq!(stats::hits(), 1);
        assert_eq!(stats::misses(), 1);
    }

    #[test]
    fn clear_removes_all_entries() {
        let _guard = env_guard();
        let _fixture = CacheFixture::new();
        let request = json!({"path": "/x"});
        put(&request, &json!({"content": "x"}));
        clear();
        assert!(get(&request).is_none());
    }

    #[test]
    fn disabled_cache_neither_reads_nor_writes() {
        let _guard = env_guard();
        let _fixture = CacheFixture::new();
        let request = json!({"path": "/y"});
        put(&request, &json!({"content": "y"}));

        stats::set_enabled(false);
        assert!(get(&request).is_none());
        put(&json!({"path": "/z"}), &json!({"content": "z"}));
        stats::set_enabled(true);
        assert!(get(&json!({"path": "/z"})).is_none());
        assert_eq!(get(&request), Some(json!({"content": "y"})));
    }

    #[test]
    fn hash_is_stable_under_key_reordering() {
        let a = json!({"b": 1, "a": {"y": 2, "x": 3}});
        let b = json!({"a": {"x": 3, "y": 2}, "b": 1});
        assert_eq!(request_hash(&a).unwrap(), request_hash(&b).unwrap());
        // Known-answer check so the hex encoding can't silently change.
        assert_eq!(request_hash(&a).unwrap().len(), 64);
    }

    #[test]
    fn list_reports_labels_and_sizes() {
        let _guard = env_guard();
        let _fixture = CacheFixture::new();
        put(
            &json!({"type": "file_content", "path": "/calc/ops.py"}),
            &json!({"content": "def add(a, b): return a + b"}),
        );
        put(
            &json!({"type": "filesystem_seed", "prompt": "a calculator"}),
            &json!({"files": ["/calc/ops.py"]}),
        );

        let entries = list(64);
        assert_eq!(entries.len(), 2);
        let labels: Vec<&str> = entries.iter().map(|e| e.label.as_str()).collect();
        assert!(labels.contains(&"/calc/ops.py"));
        assert!(labels.contains(&"a calculator"));
        for e in &entries {
            assert_eq!(e.short_key.len(), 8);
            assert!(e.response_size > 0);
        }
    }
}
