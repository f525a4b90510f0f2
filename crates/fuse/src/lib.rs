// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! Kernel-VFS adapter: mounts the node store as a user-space filesystem.

mod fs;
mod inode;
pub mod procs;

pub use fs::TouchFs;

use anyhow::{Context, Result};
use fuser::MountOption;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use touchfs_plugins::Engine;
use touchfs_store::NodeStore;

#[derive(Debug, Clone, Default)]
pub struct MountConfig {
    pub allow_other: bool,
    pub allow_root: bool,
    pub nonempty: bool,
    pub nothreads: bool,
    pub fsname: String,
}

/// Mount and serve until unmounted. Blocks the calling thread; generation
/// work runs on the worker pool unless `nothreads` is set.
pub fn mount(
    store: Arc<NodeStore>,
    engine: Arc<Engine>,
    mountpoint: &Path,
    config: &MountConfig,
) -> Result<()> {
    let fsname = if config.fsname.is_empty() {
        touchfs_config::fsname()
    } else {
        config.fsname.clone()
    };

    let mut options = vec![MountOption::FSName(fsname), MountOption::DefaultPermissions];
    if config.allow_other {
        options.push(MountOption::AllowOther);
    }
    if config.allow_root {
        options.push(MountOption::AllowRoot);
    }
    if config.nonempty {
        options.push(MountOption::CUSTOM("nonempty".to_string()));
    }

    let fs = TouchFs::new(
        store,
        engine,
        mountpoint.to_path_buf(),
        config.nothreads,
    );
    info!(mountpoint = %mountpoint.display(), "mounting");
    fuser::mount2(fs, mountpoint, &options)
        .with_context(|| format!("mount touchfs at {}", mountpoint.display()))
}
