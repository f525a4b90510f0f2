// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! Structured-output response models. Each derives a JSON Schema that is
//! sent to the provider as the response format.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Response shape of the default text generator.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GeneratedContent {
    pub content: String,
}

/// Response shape of filesystem seed generation: a flat list of paths.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FileList {
    pub files: Vec<String>,
}

/// Response shape of the executive summary plugin.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ExecutiveSummary {
    pub title: String,
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemas_expose_expected_fields() {
        let schema = schemars::schema_for!(GeneratedContent);
        let value = serde_json::to_value(&schema).unwrap();
        assert!(value["properties"]["content"].is_object());

        let schema = schemars::schema_for!(FileList);
        let value = serde_json::to_value(&schema).unwrap();
        assert!(value["properties"]["files"].is_object());
    }
}
