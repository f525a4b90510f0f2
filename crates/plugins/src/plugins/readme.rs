// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! Human-readable description of the current tree.

use anyhow::Result;

use touchfs_store::{Node, NodeStore};

use crate::{owns_by_xattr, proc_overlay_file, proc_path, Generated, OverlayNode, Plugin, PluginEnv};

pub struct ReadmeGenerator;

impl Plugin for ReadmeGenerator {
    fn name(&self) -> &'static str {
        "readme"
    }

    fn can_handle(&self, path: &str, node: &Node) -> bool {
        path == proc_path("readme") || owns_by_xattr(node, "readme")
    }

    fn overlay_nodes(&self) -> Vec<OverlayNode> {
        vec![proc_overlay_file("readme", "readme")]
    }

    fn generate(&self, env: &PluginEnv<'_>, _path: &str, _node: &Node) -> Result<Generated> {
        let mut lines = Vec::new();
        build_tree(env.store, "/", "", &mut lines);
        let tree = lines.join("\n");

        Ok(Generated::Text(format!(
            "# Project Structure\n\n\
             This directory contains the following structure:\n\n\
             {tree}\n\n\
             Files marked [generated] are produced on demand from the owning\n\
             generator and the current state of the filesystem.\n"
        )))
    }
}

fn build_tree(store: &NodeStore, dir: &str, indent: &str, out: &mut Vec<String>) {
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
        let marker = if child.is_file() {
            if child.generator().is_some() || child.wants_generation() {
                "  [generated]"
            } else {
                "  [static]"
            }
        } else {
            ""
        };
        out.push(format!("{indent}{prefix}{name}{marker}"));

        if child.is_dir() {
            build_tree(store, child_path, &child_indent, out);
        }
    }
}
