// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! `/.touchfs/model.default`: reads back the process-global model and
//! updates it on write. Accepts raw text or `{"model": ...}`.

use anyhow::Result;
use tracing::debug;

use touchfs_store::{Content, Node};

use crate::{owns_by_xattr, proc_overlay_file, proc_path, Generated, OverlayNode, Plugin, PluginEnv};

pub struct ModelPlugin;

impl Plugin for ModelPlugin {
    fn name(&self) -> &'static str {
        "model"
    }

    fn can_handle(&self, path: &str, node: &Node) -> bool {
        path == proc_path("model.default") || owns_by_xattr(node, "model")
    }

    fn overlay_nodes(&self) -> Vec<OverlayNode> {
        vec![proc_overlay_file("model.default", "model")]
    }

    fn generate(&self, _env: &PluginEnv<'_>, _path: &str, node: &Node) -> Result<Generated> {
        if let Some(Content::Text(body)) = node.content() {
            if let Some(model) = parse_model(body) {
                touchfs_config::set_model(&model);
            }
        }
        let model = touchfs_config::current_model();
        debug!(%model, "model_read");
        Ok(Generated::Text(model))
    }
}

fn parse_model(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            return value
                .get("model")
                .and_then(|m| m.as_str())
                .map(|m| m.trim().to_string());
        }
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_raw_and_json_forms() {
        assert_eq!(parse_model(" gpt-4o \n"), Some("gpt-4o".to_string()));
        assert_eq!(
            parse_model(r#"{"model": "gpt-4o-mini"}"#),
            Some("gpt-4o-mini".to_string())
        );
        assert_eq!(parse_model("   "), None);
    }
}
