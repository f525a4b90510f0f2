// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! Content generators and the dispatch engine.
//!
//! A plugin is a capability record: a name, a `can_handle` predicate, a
//! `generate` implementation, and the overlay nodes it contributes under
//! `/.touchfs/` at registry construction. Dispatch is linear in
//! registration order; the first matching plugin wins.

mod engine;
mod registry;
mod seed;

pub mod plugins;

pub use engine::{needs_generation, Engine, GenerateError};
pub use registry::Registry;
pub use seed::{expand_file_list, generate_seed_list};

use anyhow::Result;
use touchfs_backend::CompletionBackend;
use touchfs_store::{Content, Node, NodeStore};

/// Root of the proc overlay. Every path under it is plugin-owned.
pub const PROC_DIR: &str = "/.touchfs";

pub fn proc_path(name: &str) -> String {
    format!("{PROC_DIR}/{name}")
}

pub fn is_proc_path(path: &str) -> bool {
    path == PROC_DIR || path.starts_with("/.touchfs/")
}

/// Generator output, tagged text or bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generated {
    Text(String),
    Bytes(Vec<u8>),
}

impl Generated {
    pub fn into_content(self) -> Content {
        match self {
            Generated::Text(s) => Content::Text(s),
            Generated::Bytes(b) => Content::Bytes(b),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Generated::Text(s) => s.len(),
            Generated::Bytes(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A node contributed by a plugin at registry-initialization time.
#[derive(Debug, Clone)]
pub struct OverlayNode {
    pub path: String,
    pub node: Node,
}

/// Shared services available to a running generator.
pub struct PluginEnv<'a> {
    pub store: &'a NodeStore,
    pub backend: &'a dyn CompletionBackend,
}

pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_handle(&self, path: &str, node: &Node) -> bool;

    fn generate(&self, env: &PluginEnv<'_>, path: &str, node: &Node) -> Result<Generated>;

    /// Nodes to materialize before any user operation. Empty by default.
    fn overlay_nodes(&self) -> Vec<OverlayNode> {
        Vec::new()
    }
}

/// Overlay file owned by `plugin`, dispatched through the `generator` xattr.
pub(crate) fn proc_overlay_file(name: &str, plugin: &'static str) -> OverlayNode {
    let mut node = Node::file(0o644);
    node.xattrs
        .insert(touchfs_store::XATTR_GENERATOR.to_string(), plugin.into());
    OverlayNode {
        path: proc_path(name),
        node,
    }
}

/// True when the node's `generator` xattr names `plugin`.
pub(crate) fn owns_by_xattr(node: &Node, plugin: &str) -> bool {
    node.generator().as_deref() == Some(plugin)
}
