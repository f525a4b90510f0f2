// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! Image generator, triggered by extension.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use touchfs_store::{dirname, Content, Node, NodeStore};

use crate::{Generated, Plugin, PluginEnv};

const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
// Square images are fastest to generate.
const DEFAULT_SIZE: &str = "1024x1024";
const DEFAULT_QUALITY: &str = "standard";

pub struct ImageGenerator;

impl Plugin for ImageGenerator {
    fn name(&self) -> &'static str {
        "image"
    }

    fn can_handle(&self, path: &str, node: &Node) -> bool {
        node.is_file()
            && Path::new(path)
                .extension()
                .map(|e| {
                    SUPPORTED_EXTENSIONS.contains(&e.to_string_lossy().to_lowercase().as_str())
                })
                .unwrap_or(false)
    }

    fn generate(&self, env: &PluginEnv<'_>, path: &str, _node: &Node) -> Result<Generated> {
        let subject = image_prompt(env.store, path);
        // The provider embellishes terse prompts unless told not to.
        let prompt = format!(
            "I NEED to test how the tool works with extremely simple prompts. \
             DO NOT add any detail, just use it AS-IS: {subject}"
        );
        info!(%path, %subject, "image_generation");
        let bytes = touchfs_backend::image(
            env.backend,
            DEFAULT_IMAGE_MODEL,
            &prompt,
            DEFAULT_SIZE,
            DEFAULT_QUALITY,
        )
        .with_context(|| format!("generate image for {path}"))?;
        Ok(Generated::Bytes(bytes))
    }
}

/// Prompt for an image: the nearest prompt file if one exists, otherwise the
/// filename with separators spaced out.
fn image_prompt(store: &NodeStore, path: &str) -> String {
    let mut dir = dirname(path);
    loop {
        for name in touchfs_config::PROMPT_FILE_NAMES {
            let candidate = if dir == "/" {
                format!("/{name}")
            } else {
                format!("{dir}/{name}")
            };
            let found = store.with_node(&candidate, |node| match node.content() {
                Some(Content::Text(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            });
            if let Some(Some(prompt)) = found {
                return prompt;
            }
        }
        if dir == "/" {
            break;
        }
        dir = dirname(&dir);
    }

    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().replace(['_', '-'], " "))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_supported_extensions_only() {
        let plugin = ImageGenerator;
        let node = Node::file(0o644);
        assert!(plugin.can_handle("/a/cat.png", &node));
        assert!(plugin.can_handle("/a/cat.JPG", &node));
        assert!(plugin.can_handle("/a/cat.jpeg", &node));
        assert!(!plugin.can_handle("/a/cat.gif", &node));
        assert!(!plugin.can_handle("/a/cat", &node));
    }

    #[test]
    fn prompt_derives_from_filename_without_config() {
        let store = NodeStore::new();
        assert_eq!(image_prompt(&store, "/red_sunset-beach.png"), "red sunset beach");
    }

    #[test]
    fn prompt_file_overrides_filename() {
        let store = NodeStore::new();
        store.ensure_dir_all("/pics").unwrap();
        store.insert("/pics/.prompt", Node::file(0o644)).unwrap();
        store
            .update("/pics/.prompt", |n| {
                n.set_content(Content::Text("a watercolor fox".into()))
            })
            .unwrap();
        store.insert("/pics/fox.png", Node::file(0o644)).unwrap();
        assert_eq!(image_prompt(&store, "/pics/fox.png"), "a watercolor fox");
    }
}
