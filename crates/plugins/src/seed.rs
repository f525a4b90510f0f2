// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! Filesystem seed generation: one-shot expansion of a user prompt into an
//! initial tree of empty, generation-tagged files.

use anyhow::{bail, Context, Result};
use serde_json::json;
use tracing::info;

use touchfs_backend::models::FileList;
use touchfs_backend::{CompletionBackend, Message};
use touchfs_store::{dirname, is_normalized, Node, NodeStore, StoreError, XATTR_GENERATE_CONTENT};

/// Ask the backend for a flat list of paths for `prompt`. Seed requests get
/// their own cache fingerprint so repeated mounts of the same prompt reuse
/// the layout.
pub fn generate_seed_list(backend: &dyn CompletionBackend, prompt: &str) -> Result<Vec<String>> {
    let model = touchfs_config::current_model();
    let request = json!({
        "type": "filesystem_seed",
        "prompt": prompt,
        "model": model,
    });
    if let Some(hit) = touchfs_cache::get(&request) {
        if let Ok(parsed) = serde_json::from_value::<FileList>(hit) {
            return Ok(parsed.files);
        }
    }

    let schema = schemars::gen::SchemaGenerator::default().into_root_schema_for::<FileList>();
    let schema = serde_json::to_value(schema)?;
    let messages = [
        Message::system(touchfs_config::seed_system_prompt()),
        Message::user(prompt),
    ];
    let value = backend
        .chat(&model, &messages, "file_list", &schema)
        .context("generate filesystem layout")?;
    let parsed: FileList = serde_json::from_value(value.clone())
        .context("filesystem layout response does not match schema")?;
    touchfs_cache::put(&request, &value);
    info!(files = parsed.files.len(), "seed_list_generated");
    Ok(parsed.files)
}

/// Expand a path list into the tree: every ancestor becomes a directory,
/// every leaf an empty file tagged for one-shot generation.
///
/// The whole operation is rejected if any path is not an absolute,
/// normalized POSIX path; nothing is inserted in that case. Paths with
/// components in the plugin namespace are skipped, never created.
pub fn expand_file_list(store: &NodeStore, files: &[String]) -> Result<()> {
    for path in files {
        if path == "/" || !is_normalized(path) {
            bail!("invalid seed path '{path}': paths must be absolute and normalized");
        }
    }

    for path in files {
        if path.split('/').any(|c| c.starts_with(".touchfs")) {
            continue;
        }
        store
            .ensure_dir_all(&dirname(path))
            .with_context(|| format!("create parents of {path}"))?;
        let mut node = Node::file(0o644);
        node.xattrs
            .insert(XATTR_GENERATE_CONTENT.to_string(), b"true".to_vec());
        match store.insert(path, node) {
            Ok(()) | Err(StoreError::Exists) => {}
            Err(e) => return Err(e).with_context(|| format!("insert {path}")),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expansion_creates_ancestors_and_tagged_leaves() {
        let store = NodeStore::new();
        let files = vec![
            "/calculator/__init__.py".to_string(),
            "/calculator/operations.py".to_string(),
            "/tests/test_operations.py".to_string(),
        ];
        expand_file_list(&store, &files).unwrap();

        assert!(store.find("/calculator").unwrap().is_dir());
        let node = store.find("/calculator/operations.py").unwrap();
        assert!(node.is_file());
        assert_eq!(node.size(), 0);
        assert!(node.wants_generation());
    }

    #[test]
    fn relative_or_unnormalized_paths_reject_the_whole_batch() {
        let store = NodeStore::new();
        let before = store.paths();
        let files = vec!["/ok.txt".to_string(), "src/main.py".to_string()];
        assert!(expand_file_list(&store, &files).is_err());
        assert_eq!(store.paths(), before);

        let files = vec!["/a//b.txt".to_string()];
        assert!(expand_file_list(&store, &files).is_err());
        assert_eq!(store.paths(), before);
    }

    #[test]
    fn plugin_namespace_is_never_seeded() {
        let store = NodeStore::new();
        let files = vec![
            "/.touchfs/evil".to_string(),
            "/proj/.touchfs.prompt".to_string(),
            "/proj/main.py".to_string(),
        ];
        expand_file_list(&store, &files).unwrap();
        assert!(!store.contains("/.touchfs/evil"));
        assert!(!store.contains("/proj/.touchfs.prompt"));
        assert!(store.contains("/proj/main.py"));
    }
}
