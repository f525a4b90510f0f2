// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! Configuration: process-global settings, nearest-file resolution, logging.

mod logging;
mod resolve;
mod settings;

pub use logging::{
    active_log_path, init_cli_logging, init_mount_logging, log_dir, rotate_logs, LOG_FILE_NAME,
};
pub use resolve::{
    resolve_model, resolve_prompt, ConfigError, MODEL_FILE_NAMES, PROMPT_FILE_NAMES,
};
pub use settings::{
    current_model, fsname, global_prompt, overlay_root, seed_prompt, seed_system_prompt,
    set_global_prompt, set_model, set_overlay_root, test_tag, DEFAULT_MODEL, ENV_DEFAULT_MODEL,
    ENV_FILESYSTEM_PROMPT, ENV_FSNAME, ENV_GLOBAL_PROMPT, ENV_PROMPT, ENV_TEST_TAG,
};
