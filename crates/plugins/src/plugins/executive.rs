// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! LLM-written synopsis of the tree, memoized in-process on a stable
//! structural hash so an unchanged tree never re-hits the backend.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use touchfs_backend::models::ExecutiveSummary;
use touchfs_backend::Message;
use touchfs_store::{Node, NodeStore};

use crate::{
    is_proc_path, owns_by_xattr, proc_overlay_file, proc_path, Generated, OverlayNode, Plugin,
    PluginEnv,
};

pub struct ExecutiveGenerator {
    memo: Mutex<HashMap<String, String>>,
}

impl ExecutiveGenerator {
    pub fn new() -> Self {
        ExecutiveGenerator {
            memo: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for ExecutiveGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for ExecutiveGenerator {
    fn name(&self) -> &'static str {
        "executive"
    }

    fn can_handle(&self, path: &str, node: &Node) -> bool {
        path == proc_path("executive") || owns_by_xattr(node, "executive")
    }

    fn overlay_nodes(&self) -> Vec<OverlayNode> {
        vec![proc_overlay_file("executive", "executive")]
    }

    fn generate(&self, env: &PluginEnv<'_>, _path: &str, _node: &Node) -> Result<Generated> {
        let key = structure_key(env.store);
        if let Some(cached) = self.memo.lock().expect("memo poisoned").get(&key) {
            debug!("executive_memo_hit");
            return Ok(Generated::Text(cached.clone()));
        }

        let stats = analyze(env.store);
        let info = stats.render();
        let messages = [
            Message::system(
                "You summarize filesystem state for a human operator. Produce a \
                 brief executive summary (50-80 tokens) of what the project \
                 contains and which parts are generated on demand.",
            ),
            Message::user(format!("Filesystem information to summarize:\n\n{info}")),
        ];
        let model = touchfs_config::current_model();
        let parsed: ExecutiveSummary =
            touchfs_backend::chat_parsed(env.backend, &model, &messages, "executive_summary")
                .context("generate executive summary")?;

        let text = format!("# {}\n\n{}\n", parsed.title, parsed.summary);
        self.memo
            .lock()
            .expect("memo poisoned")
            .insert(key, text.clone());
        Ok(Generated::Text(text))
    }
}

/// Stable hash over the shape of the tree: paths, kinds, extensions, and
/// generation tags. Content and times are deliberately excluded. The main
/// tree and the proc overlay are hashed separately, so a control-file write
/// cannot invalidate the project summary.
fn structure_key(store: &NodeStore) -> String {
    let mut main = Sha256::new();
    let mut proc = Sha256::new();
    for path in store.paths() {
        let Some(signature) = store.with_node(&path, |node| signature(&path, node)) else {
            continue;
        };
        if is_proc_path(&path) {
            proc.update(signature.as_bytes());
        } else {
            main.update(signature.as_bytes());
        }
    }
    format!("{:x}:{:x}", main.finalize(), proc.finalize())
}

fn signature(path: &str, node: &Node) -> String {
    let kind = match &node.kind {
        touchfs_store::NodeKind::File { .. } => "file",
        touchfs_store::NodeKind::Directory { .. } => "directory",
        touchfs_store::NodeKind::Symlink { .. } => "symlink",
    };
    format!(
        "{path}|{kind}|{}|{}\n",
        node.generator().unwrap_or_default(),
        node.wants_generation(),
    )
}

#[derive(Default)]
struct TreeStats {
    files: usize,
    dirs: usize,
    symlinks: usize,
    generated: usize,
    extensions: BTreeMap<String, usize>,
    generators: BTreeSet<String>,
    key_files: Vec<String>,
}

const KEY_FILE_NAMES: [&str; 8] = [
    "readme.md",
    "requirements.txt",
    "setup.py",
    "pyproject.toml",
    "package.json",
    "dockerfile",
    "makefile",
    ".gitignore",
];

fn analyze(store: &NodeStore) -> TreeStats {
    let mut stats = TreeStats::default();
    for path in store.paths() {
        if path == "/" || is_proc_path(&path) {
            continue;
        }
        let Some(node) = store.find(&path) else {
            continue;
        };
        match &node.kind {
            touchfs_store::NodeKind::Directory { .. } => stats.dirs += 1,
            touchfs_store::NodeKind::Symlink { .. } => stats.symlinks += 1,
            touchfs_store::NodeKind::File { .. } => {
                stats.files += 1;
                if let Some(ext) = Path::new(&path).extension() {
                    *stats
                        .extensions
                        .entry(ext.to_string_lossy().to_lowercase())
                        .or_insert(0) += 1;
                }
                if let Some(generator) = node.generator() {
                    stats.generated += 1;
                    stats.generators.insert(generator);
                } else if node.wants_generation() {
                    stats.generated += 1;
                    stats.generators.insert("default".to_string());
                }
                let name = Path::new(&path)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                if KEY_FILE_NAMES.contains(&name.as_str()) {
                    stats.key_files.push(path.clone());
                }
            }
        }
    }
    stats.key_files.sort();
    stats
}

impl TreeStats {
    fn render(&self) -> String {
        let mut lines = vec![
            "STATISTICS:".to_string(),
            format!("Files: {}", self.files),
            format!("Directories: {}", self.dirs),
            format!("Symlinks: {}", self.symlinks),
        ];
        if self.generated > 0 {
            lines.push(format!("Generated Files: {}", self.generated));
        }
        if !self.extensions.is_empty() {
            lines.push("\nFILE TYPES:".to_string());
            let mut by_count: Vec<(&String, &usize)> = self.extensions.iter().collect();
            by_count.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
            for (ext, count) in by_count.into_iter().take(5) {
                lines.push(format!(".{ext}: {count}"));
            }
        }
        if !self.generators.is_empty() {
            lines.push("\nACTIVE GENERATORS:".to_string());
            for g in &self.generators {
                lines.push(g.clone());
            }
        }
        if !self.key_files.is_empty() {
            lines.push("\nKEY FILES:".to_string());
            for f in &self.key_files {
                lines.push(f.clone());
            }
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use touchfs_store::{dirname, Content};

    fn sample_store() -> NodeStore {
        let store = NodeStore::new();
        for p in ["/calc/add.py", "/README.md"] {
            store.ensure_dir_all(&dirname(p)).unwrap();
            store.insert(p, Node::file(0o644)).unwrap();
        }
        store
    }

    #[test]
    fn structure_key_ignores_content_changes() {
        let store = sample_store();
        let a = structure_key(&store);
        store
            .update("/calc/add.py", |n| {
                n.set_content(Content::Text("def add(): pass".into()))
            })
            .unwrap();
        assert_eq!(structure_key(&store), a);

        store.insert("/new.txt", Node::file(0o644)).unwrap();
        assert_ne!(structure_key(&store), a);
    }

    #[test]
    fn proc_changes_do_not_disturb_the_main_hash() {
        let store = sample_store();
        let a = structure_key(&store);
        store.ensure_dir_all("/.touchfs").unwrap();
        store
            .insert("/.touchfs/tree", Node::file(0o644))
            .unwrap();
        let b = structure_key(&store);
        assert_eq!(a.split(':').next(), b.split(':').next());
        assert_ne!(a, b);
    }

    #[test]
    fn analysis_counts_types_and_key_files() {
        let store = sample_store();
        store
            .set_xattr("/calc/add.py", touchfs_store::XATTR_GENERATE_CONTENT, b"true")
            .unwrap();
        let stats = analyze(&store);
        assert_eq!(stats.files, 2);
        assert_eq!(stats.dirs, 1);
        assert_eq!(stats.generated, 1);
        assert!(stats.generators.contains("default"));
        assert_eq!(stats.key_files, vec!["/README.md".to_string()]);
        let rendered = stats.render();
        assert!(rendered.contains("Files: 2"));
        assert!(rendered.contains(".py: 1"));
    }
}
