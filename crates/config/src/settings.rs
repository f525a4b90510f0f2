// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! Process-global configuration.
//!
//! The current model, the global prompt, and the overlay root are mutable at
//! runtime (the proc plugins write them); everything else is resolved from
//! the environment on first use. All accessors are safe to call from any
//! kernel-adapter thread.

use std::path::PathBuf;
use std::sync::{OnceLock, RwLock};

/// Fixed fallback when neither the environment nor a `.model` file says
/// otherwise.
pub const DEFAULT_MODEL: &str = "gpt-4o-2024-08-06";

pub const ENV_PROMPT: &str = "TOUCHFS_PROMPT";
pub const ENV_GLOBAL_PROMPT: &str = "TOUCHFS_GLOBAL_PROMPT";
pub const ENV_FILESYSTEM_PROMPT: &str = "TOUCHFS_FILESYSTEM_GENERATION_PROMPT";
pub const ENV_DEFAULT_MODEL: &str = "TOUCHFS_DEFAULT_MODEL";
pub const ENV_FSNAME: &str = "TOUCHFS_FSNAME";
pub const ENV_TEST_TAG: &str = "TOUCHFS_TEST_TAG";

const CONTENT_TEMPLATE: &str = include_str!("../templates/content_generation.prompt");
const SEED_TEMPLATE: &str = include_str!("../templates/filesystem_generation.prompt");

fn model_cell() -> &'static RwLock<String> {
    static CELL: OnceLock<RwLock<String>> = OnceLock::new();
    CELL.get_or_init(|| {
        let initial = std::env::var(ENV_DEFAULT_MODEL)
            .ok()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        RwLock::new(initial)
    })
}

fn prompt_cell() -> &'static RwLock<Option<String>> {
    static CELL: OnceLock<RwLock<Option<String>>> = OnceLock::new();
    CELL.get_or_init(|| RwLock::new(None))
}

fn overlay_cell() -> &'static RwLock<Option<PathBuf>> {
    static CELL: OnceLock<RwLock<Option<PathBuf>>> = OnceLock::new();
    CELL.get_or_init(|| RwLock::new(None))
}

pub fn current_model() -> String {
    model_cell().read().expect("settings lock poisoned").clone()
}

/// Update the process-global model. Whitespace is trimmed; empty input is
/// ignored so a stray newline written to `model.default` cannot wipe the
/// setting.
pub fn set_model(model: &str) {
    let trimmed = model.trim();
    if trimmed.is_empty() {
        return;
    }
    tracing::info!(model = %trimmed, "model_updated");
    *model_cell().write().expect("settings lock poisoned") = trimmed.to_string();
}

/// Global content-generation prompt: runtime setting, then environment, then
/// the packaged template.
pub fn global_prompt() -> String {
    if let Some(p) = prompt_cell().read().expect("settings lock poisoned").clone() {
        return p;
    }
    for var in [ENV_GLOBAL_PROMPT, ENV_PROMPT] {
        if let Ok(p) = std::env::var(var) {
            if !p.trim().is_empty() {
                return p;
            }
        }
    }
    CONTENT_TEMPLATE.trim().to_string()
}

pub fn set_global_prompt(prompt: &str) {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return;
    }
    tracing::info!("global_prompt_updated");
    *prompt_cell().write().expect("settings lock poisoned") = Some(trimmed.to_string());
}

/// Seed prompt: explicit argument, then environment. `None` means "mount an
/// empty tree".
pub fn seed_prompt(prompt_arg: Option<&str>) -> Option<String> {
    if let Some(p) = prompt_arg {
        if !p.trim().is_empty() {
            return Some(p.to_string());
        }
    }
    std::env::var(ENV_FILESYSTEM_PROMPT)
        .ok()
        .filter(|p| !p.trim().is_empty())
}

/// System prompt for filesystem seed generation.
pub fn seed_system_prompt() -> &'static str {
    SEED_TEMPLATE
}

/// Overlay root: a real directory searched for `.prompt`/`.model` files
/// before the in-mount tree.
pub fn overlay_root() -> Option<PathBuf> {
    overlay_cell().read().expect("settings lock poisoned").clone()
}

pub fn set_overlay_root(path: Option<PathBuf>) {
    *overlay_cell().write().expect("settings lock poisoned") = path;
}

/// Host-visible filesystem name.
pub fn fsname() -> String {
    std::env::var(ENV_FSNAME)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "touchfs".to_string())
}

pub fn test_tag() -> Option<String> {
    std::env::var(ENV_TEST_TAG).ok().filter(|s| !s.is_empty())
}
