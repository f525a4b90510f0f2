// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Reserved xattr naming the plugin that owns generation for a file.
pub const XATTR_GENERATOR: &str = "generator";
/// Reserved xattr marking an empty file for one-shot generation.
pub const XATTR_GENERATE_CONTENT: &str = "generate_content";

const DEFAULT_SYMLINK_MODE: u32 = libc::S_IFLNK | 0o777;

/// File content is tagged text or bytes; images flow through the bytes arm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Bytes(Vec<u8>),
}

impl Content {
    pub fn len(&self) -> usize {
        match self {
            Content::Text(s) => s.len(),
            Content::Bytes(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Content::Text(s) => s.as_bytes(),
            Content::Bytes(b) => b.as_slice(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    File {
        /// `None` means the file is empty and has never been materialized.
        content: Option<Content>,
    },
    Directory {
        /// Child name to absolute child path.
        children: BTreeMap<String, String>,
    },
    Symlink {
        target: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Times {
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl Times {
    pub fn now() -> Self {
        let now = now_secs();
        Times {
            atime: now,
            mtime: now,
            ctime: now,
        }
    }
}

pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// A single entity in the tree: file, directory, or symlink.
///
/// Size is always derived from content, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub mode: u32,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub times: Times,
    pub xattrs: BTreeMap<String, Vec<u8>>,
}

impl Node {
    pub fn file(mode: u32) -> Self {
        Node {
            kind: NodeKind::File { content: None },
            mode: libc::S_IFREG | (mode & 0o7777),
            uid: None,
            gid: None,
            times: Times::now(),
            xattrs: BTreeMap::new(),
        }
    }

    pub fn directory(mode: u32) -> Self {
        Node {
            kind: NodeKind::Directory {
                children: BTreeMap::new(),
            },
            mode: libc::S_IFDIR | (mode & 0o7777),
            uid: None,
            gid: None,
            times: Times::now(),
            xattrs: BTreeMap::new(),
        }
    }

    pub fn symlink(target: impl Into<String>) -> Self {
        Node {
            kind: NodeKind::Symlink {
                target: target.into(),
            },
            mode: DEFAULT_SYMLINK_MODE,
            uid: None,
            gid: None,
            times: Times::now(),
            xattrs: BTreeMap::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File { .. })
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self.kind, NodeKind::Symlink { .. })
    }

    /// Derived size: 0 for directories, target length for symlinks, content
    /// length for files.
    pub fn size(&self) -> u64 {
        match &self.kind {
            NodeKind::Directory { .. } => 0,
            NodeKind::Symlink { target } => target.len() as u64,
            NodeKind::File { content } => {
                content.as_ref().map(|c| c.len() as u64).unwrap_or(0)
            }
        }
    }

    pub fn content(&self) -> Option<&Content> {
        match &self.kind {
            NodeKind::File { content } => content.as_ref(),
            _ => None,
        }
    }

    pub fn set_content(&mut self, content: Content) {
        if let NodeKind::File {
            content: ref mut slot,
        } = self.kind
        {
            *slot = Some(content);
            self.times.mtime = now_secs();
        }
    }

    pub fn children(&self) -> Option<&BTreeMap<String, String>> {
        match &self.kind {
            NodeKind::Directory { children } => Some(children),
            _ => None,
        }
    }

    pub fn xattr(&self, name: &str) -> Option<&[u8]> {
        self.xattrs.get(name).map(|v| v.as_slice())
    }

    /// True when the node carries `generate_content=true`.
    pub fn wants_generation(&self) -> bool {
        self.xattr(XATTR_GENERATE_CONTENT)
            .map(|v| v == b"true")
            .unwrap_or(false)
    }

    /// Name of the plugin pinned via the `generator` xattr, if any.
    pub fn generator(&self) -> Option<String> {
        self.xattr(XATTR_GENERATOR)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }
}
