// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! `/.touchfs/prompt.default`: reads back the global prompt and updates it
//! on write. Accepts raw text or `{"prompt": ...}`.

use anyhow::Result;

use touchfs_store::{Content, Node};

use crate::{owns_by_xattr, proc_overlay_file, proc_path, Generated, OverlayNode, Plugin, PluginEnv};

pub struct PromptPlugin;

impl Plugin for PromptPlugin {
    fn name(&self) -> &'static str {
        "prompt"
    }

    fn can_handle(&self, path: &str, node: &Node) -> bool {
        path == proc_path("prompt.default") || owns_by_xattr(node, "prompt")
    }

    fn overlay_nodes(&self) -> Vec<OverlayNode> {
        vec![proc_overlay_file("prompt.default", "prompt")]
    }

    fn generate(&self, _env: &PluginEnv<'_>, _path: &str, node: &Node) -> Result<Generated> {
        if let Some(Content::Text(body)) = node.content() {
            if let Some(prompt) = parse_prompt(body) {
                touchfs_config::set_global_prompt(&prompt);
            }
        }
        Ok(Generated::Text(format!("{}\n", touchfs_config::global_prompt())))
    }
}

fn parse_prompt(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            return value
                .get("prompt")
                .and_then(|p| p.as_str())
                .map(|p| p.trim().to_string());
        }
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_raw_and_json_forms() {
        assert_eq!(parse_prompt("write tests"), Some("write tests".to_string()));
        assert_eq!(
            parse_prompt(r#"{"prompt": "be terse"}"#),
            Some("be terse".to_string())
        );
        assert_eq!(parse_prompt(""), None);
    }
}
