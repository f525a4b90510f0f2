// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

use tracing::debug;

use touchfs_store::{dirname, Node, NodeStore, StoreError};

use crate::plugins::{
    cache_control::CacheControlPlugin, default_gen::DefaultGenerator,
    executive::ExecutiveGenerator, image::ImageGenerator, log_symlink::LogSymlinkPlugin,
    model::ModelPlugin, prompt::PromptPlugin, readme::ReadmeGenerator, tree::TreeGenerator,
};
use crate::Plugin;

/// Holds content generators and resolves which one handles a path.
pub struct Registry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl Registry {
    pub fn empty() -> Self {
        Registry {
            plugins: Vec::new(),
        }
    }

    /// All built-in plugins in dispatch order. The default text generator is
    /// last: it accepts anything without a pinned generator, so specific
    /// matchers (extension, proc paths) must come first.
    pub fn with_builtins() -> Self {
        let mut registry = Registry::empty();
        registry.register(Box::new(ReadmeGenerator));
        registry.register(Box::new(TreeGenerator));
        registry.register(Box::new(ExecutiveGenerator::new()));
        registry.register(Box::new(PromptPlugin));
        registry.register(Box::new(ModelPlugin));
        registry.register(Box::new(CacheControlPlugin));
        registry.register(Box::new(LogSymlinkPlugin));
        registry.register(Box::new(ImageGenerator));
        registry.register(Box::new(DefaultGenerator));
        registry
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        debug!(plugin = plugin.name(), "plugin_registered");
        self.plugins.push(plugin);
    }

    /// First registered plugin whose `can_handle` accepts the path.
    pub fn dispatch(&self, path: &str, node: &Node) -> Option<&dyn Plugin> {
        self.plugins
            .iter()
            .map(|p| p.as_ref())
            .find(|p| p.can_handle(path, node))
    }

    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Insert every plugin's overlay nodes into the tree, creating missing
    /// parents. Runs before any user interaction.
    pub fn materialize_overlays(&self, store: &NodeStore) -> Result<(), StoreError> {
        for plugin in &self.plugins {
            for overlay in plugin.overlay_nodes() {
                store.ensure_dir_all(&dirname(&overlay.path))?;
                match store.insert(&overlay.path, overlay.node) {
                    Ok(()) => {}
                    Err(StoreError::Exists) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{is_proc_path, proc_path};

    #[test]
    fn overlays_are_materialized_under_the_proc_dir() {
        let registry = Registry::with_builtins();
        let store = NodeStore::new();
        registry.materialize_overlays(&store).unwrap();

        for name in [
            "model.default",
            "prompt.default",
            "cache_enabled",
            "cache_stats",
            "cache_clear",
            "cache_list",
            "tree",
            "readme",
            "executive",
            "log",
        ] {
            assert!(store.contains(&proc_path(name)), "missing overlay {name}");
        }
        assert!(store.find(crate::PROC_DIR).unwrap().is_dir());
    }

    #[test]
    fn image_extension_beats_the_default_generator() {
        let registry = Registry::with_builtins();
        let node = Node::file(0o644);
        assert_eq!(registry.dispatch("/pics/cat.png", &node).unwrap().name(), "image");
        assert_eq!(registry.dispatch("/notes.md", &node).unwrap().name(), "default");
    }

    #[test]
    fn proc_files_dispatch_to_their_owner() {
        let registry = Registry::with_builtins();
        let store = NodeStore::new();
        registry.materialize_overlays(&store).unwrap();

        let path = proc_path("cache_stats");
        let node = store.find(&path).unwrap();
        assert_eq!(registry.dispatch(&path, &node).unwrap().name(), "cache_control");
        assert!(is_proc_path(&path));
    }

    #[test]
    fn pinned_generator_xattr_wins_for_user_files() {
        let registry = Registry::with_builtins();
        let store = NodeStore::new();
        store.insert("/banner.txt", Node::file(0o644)).unwrap();
        store
            .set_xattr("/banner.txt", touchfs_store::XATTR_GENERATOR, b"readme")
            .unwrap();
        let node = store.find("/banner.txt").unwrap();
        assert_eq!(registry.dispatch("/banner.txt", &node).unwrap().name(), "readme");
    }
}
