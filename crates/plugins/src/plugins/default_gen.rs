// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! Default text generator: resolves the nearest prompt and model, then asks
//! the chat backend for a `{content}` object.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::debug;

use touchfs_backend::models::GeneratedContent;
use touchfs_backend::Message;
use touchfs_store::Node;

use crate::{Generated, Plugin, PluginEnv, PROC_DIR};

pub struct DefaultGenerator;

impl Plugin for DefaultGenerator {
    fn name(&self) -> &'static str {
        "default"
    }

    /// Accepts any file that has no pinned generator (or is pinned to us).
    fn can_handle(&self, _path: &str, node: &Node) -> bool {
        node.is_file()
            && match node.generator() {
                None => true,
                Some(g) => g == "default",
            }
    }

    fn generate(&self, env: &PluginEnv<'_>, path: &str, _node: &Node) -> Result<Generated> {
        let overlay = touchfs_config::overlay_root();
        let prompt = touchfs_config::resolve_prompt(env.store, path, overlay.as_deref())?;
        let model = touchfs_config::resolve_model(env.store, path, overlay.as_deref())?;
        debug!(%path, %model, "default_generation");

        let structure = visible_structure(&env.store.serialize_public());
        let user = format!(
            "Generate content for the file {path}.\n\n\
             Current filesystem structure:\n{structure}\n\n\
             Requirements:\n\
             1. Content must be specific to this path.\n\
             2. Content must fit the file's name and location.\n\
             3. Content must differ from sibling files.\n\
             4. Content must follow standard conventions for the file type.\n",
            structure = serde_json::to_string_pretty(&structure)?,
        );
        let messages = [Message::system(prompt), Message::user(user)];

        let parsed: GeneratedContent =
            touchfs_backend::chat_parsed(env.backend, &model, &messages, "generated_content")
                .with_context(|| format!("generate content for {path}"))?;
        Ok(Generated::Text(parsed.content))
    }
}

/// Structure view with the proc overlay filtered out, so control files never
/// leak into prompts.
fn visible_structure(view: &Value) -> Value {
    let Some(map) = view.as_object() else {
        return view.clone();
    };
    let filtered: Map<String, Value> = map
        .iter()
        .filter(|(path, _)| *path != PROC_DIR && !path.starts_with("/.touchfs/"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Value::Object(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn proc_paths_are_filtered_from_the_structure_view() {
        let view = json!({
            "/": {"type": "directory"},
            "/.touchfs": {"type": "directory"},
            "/.touchfs/tree": {"type": "file"},
            "/main.py": {"type": "file"},
        });
        let visible = visible_structure(&view);
        let keys: Vec<&String> = visible.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["/", "/main.py"]);
    }

    #[test]
    fn handles_only_unpinned_or_self_pinned_files() {
        let plugin = DefaultGenerator;
        let mut node = Node::file(0o644);
        assert!(plugin.can_handle("/a.txt", &node));
        node.xattrs
            .insert(touchfs_store::XATTR_GENERATOR.into(), b"image".to_vec());
        assert!(!plugin.can_handle("/a.txt", &node));
        node.xattrs
            .insert(touchfs_store::XATTR_GENERATOR.into(), b"default".to_vec());
        assert!(plugin.can_handle("/a.txt", &node));
    }
}
