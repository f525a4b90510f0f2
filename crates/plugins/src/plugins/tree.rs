// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! Greppable tree visualization with a generator column.

use anyhow::Result;

use touchfs_store::{basename, Content, Node, NodeStore};

use crate::{owns_by_xattr, proc_overlay_file, proc_path, Generated, OverlayNode, Plugin, PluginEnv};

pub struct TreeGenerator;

impl Plugin for TreeGenerator {
    fn name(&self) -> &'static str {
        "tree"
    }

    fn can_handle(&self, path: &str, node: &Node) -> bool {
        path == proc_path("tree") || owns_by_xattr(node, "tree")
    }

    fn overlay_nodes(&self) -> Vec<OverlayNode> {
        vec![proc_overlay_file("tree", "tree")]
    }

    fn generate(&self, env: &PluginEnv<'_>, _path: &str, _node: &Node) -> Result<Generated> {
        let mut rows = Vec::new();
        collect_rows(env.store, "/", "", &mut rows);
        let width = rows
            .iter()
            .map(|(line, _)| line.chars().count())
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        for (line, info) in rows {
            if info.is_empty() {
                out.push_str(&line);
            } else {
                let pad = width.saturating_sub(line.chars().count());
                out.push_str(&format!("{line}{} │ {info}", " ".repeat(pad)));
            }
            out.push('\n');
        }
        Ok(Generated::Text(out))
    }
}

/// One row per entry: the tree line and the annotation column.
fn collect_rows(store: &NodeStore, dir: &str, indent: &str, out: &mut Vec<(String, String)>) {
    let Some(parent) = store.find(dir) else {
        return;
    };
    let Some(children) = parent.children() else {
        return;
    };
    let names: Vec<&String> = children.keys().collect();
    for (i, name) in names.iter().enumerate() {
        let child_path = &children[*name];
        let is_last = i == names.len() - 1;
        let prefix = if is_last { "└── " } else { "├── " };
        let child_indent = format!("{indent}{}", if is_last { "    " } else { "│   " });

        let Some(child) = store.find(child_path) else {
            continue;
        };
        let line = format!("{indent}{prefix}{name}");
        out.push((line, annotate(child_path, &child)));

        if child.is_dir() {
            collect_rows(store, child_path, &child_indent, out);
        }
    }
}

fn annotate(path: &str, node: &Node) -> String {
    if !node.is_file() {
        return String::new();
    }
    let name = basename(path);
    if name.ends_with(".prompt") {
        return match node.content() {
            Some(Content::Text(s)) if !s.trim().is_empty() => {
                format!("prompt: {}", excerpt(s, 60))
            }
            _ => String::new(),
        };
    }
    if name.ends_with(".model") {
        return match node.content() {
            Some(Content::Text(s)) if !s.trim().is_empty() => format!("model: {}", s.trim()),
            _ => String::new(),
        };
    }
    if let Some(generator) = node.generator() {
        return generator;
    }
    if node.wants_generation() {
        return "default".to_string();
    }
    String::new()
}

/// Single-line excerpt, truncated with an ellipsis.
fn excerpt(content: &str, width: usize) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= width {
        return flat;
    }
    let cut: String = flat.chars().take(width.saturating_sub(3)).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_flattens_and_truncates() {
        assert_eq!(excerpt("one\n two   three", 60), "one two three");
        let long = "word ".repeat(40);
        let e = excerpt(&long, 20);
        assert_eq!(e.chars().count(), 20);
        assert!(e.ends_with("..."));
    }

    #[test]
    fn annotation_prefers_pinned_generator() {
        let mut node = Node::file(0o644);
        node.xattrs
            .insert(touchfs_store::XATTR_GENERATOR.into(), b"image".to_vec());
        assert_eq!(annotate("/pic.png", &node), "image");

        let mut node = Node::file(0o644);
        node.xattrs
            .insert(touchfs_store::XATTR_GENERATE_CONTENT.into(), b"true".to_vec());
        assert_eq!(annotate("/f.txt", &node), "default");
    }

    #[test]
    fn config_files_show_their_content() {
        let mut node = Node::file(0o644);
        node.set_content(Content::Text("only emit OK".into()));
        assert_eq!(annotate("/p/.prompt", &node), "prompt: only emit OK");

        let mut node = Node::file(0o644);
        node.set_content(Content::Text("gpt-4o\n".into()));
        assert_eq!(annotate("/p/.model", &node), "model: gpt-4o");
    }
}
