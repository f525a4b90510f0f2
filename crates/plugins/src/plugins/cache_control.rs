// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! Cache control knobs under `/.touchfs/`:
//!
//! - `cache_enabled`: write `0`/`1` to toggle, read back `0\n`/`1\n`
//! - `cache_stats`: read-only counters and size
//! - `cache_clear`: write `1` to purge
//! - `cache_list`: read-only listing of the most recent 64 entries

use anyhow::Result;
use tracing::{info, warn};

use touchfs_store::{basename, Content, Node};

use crate::{owns_by_xattr, proc_overlay_file, proc_path, Generated, OverlayNode, Plugin, PluginEnv};

const LIST_LIMIT: usize = 64;

pub struct CacheControlPlugin;

const CONTROL_FILES: [&str; 4] = ["cache_enabled", "cache_stats", "cache_clear", "cache_list"];

impl Plugin for CacheControlPlugin {
    fn name(&self) -> &'static str {
        "cache_control"
    }

    fn can_handle(&self, path: &str, node: &Node) -> bool {
        CONTROL_FILES.iter().any(|f| path == proc_path(f))
            || owns_by_xattr(node, "cache_control")
    }

    fn overlay_nodes(&self) -> Vec<OverlayNode> {
        CONTROL_FILES
            .iter()
            .map(|f| proc_overlay_file(f, "cache_control"))
            .collect()
    }

    fn generate(&self, _env: &PluginEnv<'_>, path: &str, node: &Node) -> Result<Generated> {
        let written = match node.content() {
            Some(Content::Text(s)) => Some(s.trim().to_string()),
            _ => None,
        };

        let out = match basename(path) {
            "cache_enabled" => {
                if let Some(value) = written.filter(|v| !v.is_empty()) {
                    match value.as_str() {
                        "1" => {
                            touchfs_cache::stats::set_enabled(true);
                            info!("cache_enabled");
                        }
                        "0" => {
                            touchfs_cache::stats::set_enabled(false);
                            info!("cache_disabled");
                        }
                        other => warn!(value = %other, "invalid_cache_toggle"),
                    }
                }
                if touchfs_cache::stats::enabled() {
                    "1\n".to_string()
                } else {
                    "0\n".to_string()
                }
            }
            "cache_stats" => {
                let stats = touchfs_cache::cache_stats();
                format!(
                    "Hits: {}\nMisses: {}\nSize: {} bytes\nEnabled: {}\n",
                    stats.hits, stats.misses, stats.size_bytes, stats.enabled
                )
            }
            "cache_clear" => {
                if written.as_deref() == Some("1") {
                    touchfs_cache::clear();
                    info!("cache_cleared_via_proc");
                }
                "Write 1 to clear cache\n".to_string()
            }
            "cache_list" => render_list(),
            other => {
                warn!(file = %other, "unknown_cache_control_file");
                String::new()
            }
        };
        Ok(Generated::Text(out))
    }
}

fn render_list() -> String {
    let entries = touchfs_cache::list(LIST_LIMIT);
    if entries.is_empty() {
        return "Cache empty\n".to_string();
    }
    let mut out = String::new();
    for e in entries {
        let timestamp = e.created.format("%b %d %H:%M");
        let label = clip(&e.label, 40);
        let size = thousands(e.response_size);
        out.push_str(&format!("{}  {}  {label:<40}  {size:>10} bytes\n", e.short_key, timestamp));
    }
    out
}

fn clip(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let cut: String = s.chars().take(width.saturating_sub(3)).collect();
    format!("{cut}...")
}

fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
