// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! Nearest-configuration resolution.
//!
//! Walks from the directory containing a file toward `/`, looking for the
//! closest `.touchfs.prompt`/`.prompt` (or `.touchfs.model`/`.model`) file.
//! An optional overlay root (a real directory outside the mount) is checked
//! at each level before the in-mount tree, so tooling can inject
//! configuration without mutating the virtual filesystem.

use std::error::Error as StdError;
use std::fmt;
use std::path::Path;

use touchfs_store::{dirname, normalize, Content, NodeStore};

use crate::settings;

pub const PROMPT_FILE_NAMES: [&str; 2] = [".touchfs.prompt", ".prompt"];
pub const MODEL_FILE_NAMES: [&str; 2] = [".touchfs.model", ".model"];

/// Malformed configuration file: content that announces itself as JSON
/// (leading `{`) but does not parse.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub path: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid config file {}: {}", self.path, self.message)
    }
}

impl StdError for ConfigError {}

/// Interpret a config file body: raw text, or a JSON object carrying `field`.
///
/// Returns `Ok(None)` when the body is empty or is a JSON object without the
/// field (the walk continues past it).
fn interpret(path: &str, body: &str, field: &str) -> Result<Option<String>, ConfigError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.starts_with('{') {
        let value: serde_json::Value =
            serde_json::from_str(trimmed).map_err(|e| ConfigError {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        return Ok(value
            .get(field)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()));
    }
    Ok(Some(trimmed.to_string()))
}

/// Check one directory level, overlay first, then the in-mount tree.
/// `subject` is the path being generated; a config file never resolves
/// against itself.
fn lookup_level(
    store: &NodeStore,
    overlay_root: Option<&Path>,
    dir: &str,
    names: &[&str],
    field: &str,
    subject: &str,
) -> Result<Option<String>, ConfigError> {
    for name in names {
        let candidate = if dir == "/" {
            format!("/{name}")
        } else {
            format!("{dir}/{name}")
        };
        if candidate == subject {
            continue;
        }
        if let Some(root) = overlay_root {
            let host_path = root.join(candidate.trim_start_matches('/'));
            if let Ok(body) = std::fs::read_to_string(&host_path) {
                if let Some(v) = interpret(&host_path.display().to_string(), &body, field)? {
                    tracing::debug!(path = %host_path.display(), "config_from_overlay");
                    return Ok(Some(v));
                }
            }
        }
        let body = store.with_node(&candidate, |node| match node.content() {
            Some(Content::Text(s)) => Some(s.clone()),
            _ => None,
        });
        if let Some(Some(body)) = body {
            if let Some(v) = interpret(&candidate, &body, field)? {
                tracing::debug!(path = %candidate, "config_from_tree");
                return Ok(Some(v));
            }
        }
    }
    Ok(None)
}

fn walk(
    store: &NodeStore,
    overlay_root: Option<&Path>,
    path: &str,
    names: &[&str],
    field: &str,
) -> Result<Option<String>, ConfigError> {
    let subject = normalize(path);
    let mut dir = dirname(&subject);
    loop {
        if let Some(v) = lookup_level(store, overlay_root, &dir, names, field, &subject)? {
            return Ok(Some(v));
        }
        if dir == "/" {
            return Ok(None);
        }
        dir = dirname(&dir);
    }
}

/// Prompt for generating `path`: nearest prompt file, else the global prompt.
pub fn resolve_prompt(
    store: &NodeStore,
    path: &str,
    overlay_root: Option<&Path>,
) -> Result<String, ConfigError> {
    match walk(store, overlay_root, path, &PROMPT_FILE_NAMES, "prompt")? {
        Some(p) => Ok(p),
        None => Ok(settings::global_prompt()),
    }
}

/// Model for generating `path`. The environment override beats any file.
pub fn resolve_model(
    store: &NodeStore,
    path: &str,
    overlay_root: Option<&Path>,
) -> Result<String, ConfigError> {
    if let Ok(m) = std::env::var(settings::ENV_DEFAULT_MODEL) {
        let m = m.trim().to_string();
        if !m.is_empty() {
            return Ok(m);
        }
    }
    match walk(store, overlay_root, path, &MODEL_FILE_NAMES, "model")? {
        Some(m) => Ok(m),
        None => Ok(settings::current_model()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use touchfs_store::Node;

    fn text_file(store: &NodeStore, path: &str, body: &str) {
        store.ensure_dir_all(&dirname(path)).unwrap();
        store.insert(path, Node::file(0o644)).unwrap();
        store
            .update(path, |n| n.set_content(Content::Text(body.to_string())))
            .unwrap();
    }

    #[test]
    fn nearest_prompt_wins() {
        let store = NodeStore::new();
        text_file(&store, "/.prompt", "root prompt");
        text_file(&store, "/project/.prompt", "project prompt");
        text_file(&store, "/project/src/main.py", "");
        let p = resolve_prompt(&store, "/project/src/main.py", None).unwrap();
        assert_eq!(p, "project prompt");
    }

    #[test]
    fn touchfs_variant_beats_plain_at_same_level() {
        let store = NodeStore::new();
        text_file(&store, "/project/.prompt", "plain");
        text_file(&store, "/project/.touchfs.prompt", "specific");
        text_file(&store, "/project/f.txt", "");
        let p = resolve_prompt(&store, "/project/f.txt", None).unwrap();
        assert_eq!(p, "specific");
    }

    #[test]
    fn empty_files_do_not_satisfy_the_walk() {
        let store = NodeStore::new();
        text_file(&store, "/project/.prompt", "   ");
        text_file(&store, "/.prompt", "root prompt");
        text_file(&store, "/project/f.txt", "");
        let p = resolve_prompt(&store, "/project/f.txt", None).unwrap();
        assert_eq!(p, "root prompt");
    }

    #[test]
    fn config_file_never_resolves_against_itself() {
        let store = NodeStore::new();
        text_file(&store, "/.prompt", "root prompt");
        text_file(&store, "/project/.prompt", "self");
        let p = resolve_prompt(&store, "/project/.prompt", None).unwrap();
        assert_eq!(p, "root prompt");
    }

    #[test]
    fn json_object_field_is_extracted() {
        let store = NodeStore::new();
        text_file(&store, "/.model", r#"{"model": "gpt-4o-mini"}"#);
        text_file(&store, "/f.txt", "");
        if std::env::var(settings::ENV_DEFAULT_MODEL).is_err() {
            let m = resolve_model(&store, "/f.txt", None).unwrap();
            assert_eq!(m, "gpt-4o-mini");
        }
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let store = NodeStore::new();
        text_file(&store, "/.prompt", "{not json");
        text_file(&store, "/f.txt", "");
        assert!(resolve_prompt(&store, "/f.txt", None).is_err());
    }

    #[test]
    fn raw_text_model_is_used_verbatim() {
        let store = NodeStore::new();
        text_file(&store, "/.model", "gpt-4o\n");
        text_file(&store, "/f.txt", "");
        if std::env::var(settings::ENV_DEFAULT_MODEL).is_err() {
            let m = resolve_model(&store, "/f.txt", None).unwrap();
            assert_eq!(m, "gpt-4o");
        }
    }

    #[test]
    fn overlay_root_is_searched_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".prompt"), "overlay prompt").unwrap();
        let store = NodeStore::new();
        text_file(&store, "/.prompt", "tree prompt");
        text_file(&store, "/f.txt", "");
        let p = resolve_prompt(&store, "/f.txt", Some(dir.path())).unwrap();
        assert_eq!(p, "overlay prompt");
    }
}
