// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! `/.touchfs/log`: a symlink overlay pointing at the host log file.

use anyhow::Result;

use touchfs_store::{Node, XATTR_GENERATOR};

use crate::{owns_by_xattr, proc_path, Generated, OverlayNode, Plugin, PluginEnv};

pub struct LogSymlinkPlugin;

impl Plugin for LogSymlinkPlugin {
    fn name(&self) -> &'static str {
        "log_symlink"
    }

    fn can_handle(&self, path: &str, node: &Node) -> bool {
        path == proc_path("log") || owns_by_xattr(node, "log_symlink")
    }

    fn overlay_nodes(&self) -> Vec<OverlayNode> {
        let target = touchfs_config::active_log_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "/var/log/touchfs/touchfs.log".to_string());
        let mut node = Node::symlink(target);
        node.xattrs
            .insert(XATTR_GENERATOR.to_string(), b"log_symlink".to_vec());
        vec![OverlayNode {
            path: proc_path("log"),
            node,
        }]
    }

    /// Symlinks resolve through readlink; nothing to generate.
    fn generate(&self, _env: &PluginEnv<'_>, _path: &str, _node: &Node) -> Result<Generated> {
        Ok(Generated::Text(String::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_is_a_symlink_to_the_log() {
        let overlays = LogSymlinkPlugin.overlay_nodes();
        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays[0].path, proc_path("log"));
        assert!(overlays[0].node.is_symlink());
    }
}
