// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! fuser::Filesystem implementation.
//!
//! Translates kernel operations into node-store and generation-engine
//! calls. `getattr`, `open`, and `read` may trigger generation and are
//! dispatched to a worker pool so a slow backend cannot stall the kernel
//! dispatch thread; every other operation is answered inline and never
//! blocks on generation.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use tracing::{debug, warn};

use touchfs_plugins::{is_proc_path, needs_generation, Engine};
use touchfs_store::{
    dirname, now_secs, Content, Node, NodeKind, NodeStore, StoreError, XATTR_GENERATE_CONTENT,
};

use crate::inode::{InodeTable, ROOT_INO};
use crate::procs;

/// Attributes may change behind the kernel's back when a stat triggers
/// generation, so TTLs stay short.
const ATTR_TTL: Duration = Duration::from_secs(1);
const ENTRY_TTL: Duration = Duration::ZERO;
const BLOCK_SIZE: u32 = 512;

struct UidGid {
    uid: u32,
    gid: u32,
}

impl UidGid {
    fn current() -> Self {
        UidGid {
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        }
    }
}

struct FsInner {
    store: Arc<NodeStore>,
    engine: Arc<Engine>,
    inodes: Mutex<InodeTable>,
    handles: Mutex<HashMap<u64, String>>,
    next_fh: AtomicU64,
    mount_point: PathBuf,
    nothreads: bool,
    ids: UidGid,
}

pub struct TouchFs {
    inner: Arc<FsInner>,
}

impl TouchFs {
    pub fn new(
        store: Arc<NodeStore>,
        engine: Arc<Engine>,
        mount_point: PathBuf,
        nothreads: bool,
    ) -> Self {
        TouchFs {
            inner: Arc::new(FsInner {
                store,
                engine,
                inodes: Mutex::new(InodeTable::new()),
                handles: Mutex::new(HashMap::new()),
                next_fh: AtomicU64::new(1),
                mount_point,
                nothreads,
                ids: UidGid::current(),
            }),
        }
    }

    fn dispatch(&self, job: impl FnOnce() + Send + 'static) {
        if self.inner.nothreads {
            job();
        } else {
            rayon::spawn(job);
        }
    }
}

impl FsInner {
    fn path_of(&self, ino: u64) -> Option<String> {
        self.inodes.lock().expect("inode table poisoned").path_of(ino)
    }

    fn ino_for(&self, path: &str) -> u64 {
        self.inodes
            .lock()
            .expect("inode table poisoned")
            .get_or_create(path)
    }

    fn child_path(&self, parent: u64, name: &str) -> Option<String> {
        let parent_path = self.path_of(parent)?;
        Some(if parent_path == "/" {
            format!("/{name}")
        } else {
            format!("{parent_path}/{name}")
        })
    }

    fn alloc_fh(&self, path: &str) -> u64 {
        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        self.handles
            .lock()
            .expect("handle table poisoned")
            .insert(fh, path.to_string());
        fh
    }

    fn handle_path(&self, fh: u64) -> Option<String> {
        self.handles
            .lock()
            .expect("handle table poisoned")
            .get(&fh)
            .cloned()
    }

    fn attr(&self, ino: u64, node: &Node) -> FileAttr {
        node_attr(ino, node, self.ids.uid, self.ids.gid)
    }

    /// Run generation for a path when its state demands it.
    fn generate_if_needed(&self, path: &str) -> Result<(), touchfs_plugins::GenerateError> {
        let Some(node) = self.store.find(path) else {
            return Ok(());
        };
        if needs_generation(path, &node) {
            self.engine.generate(&self.store, path)?;
        }
        Ok(())
    }
}

fn system_time(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

fn node_attr(ino: u64, node: &Node, default_uid: u32, default_gid: u32) -> FileAttr {
    let kind = match &node.kind {
        NodeKind::File { .. } => FileType::RegularFile,
        NodeKind::Directory { .. } => FileType::Directory,
        NodeKind::Symlink { .. } => FileType::Symlink,
    };
    let size = node.size();
    FileAttr {
        ino,
        size,
        blocks: size.div_ceil(BLOCK_SIZE as u64),
        atime: system_time(node.times.atime),
        mtime: system_time(node.times.mtime),
        ctime: system_time(node.times.ctime),
        crtime: system_time(node.times.ctime),
        kind,
        perm: (node.mode & 0o7777) as u16,
        nlink: if node.is_dir() { 2 } else { 1 },
        uid: node.uid.unwrap_or(default_uid),
        gid: node.gid.unwrap_or(default_gid),
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

/// Byte-oriented overlay write. Text files pad with spaces, binary files
/// with NUL; a write that is not valid UTF-8 demotes text content to bytes.
pub(crate) fn write_to_node(node: &mut Node, data: &[u8], offset: usize) -> usize {
    let (mut bytes, was_text) = match node.content() {
        Some(Content::Text(s)) => (s.clone().into_bytes(), true),
        Some(Content::Bytes(b)) => (b.clone(), false),
        None => (Vec::new(), true),
    };
    if offset > bytes.len() {
        let pad = if was_text { b' ' } else { 0u8 };
        bytes.resize(offset, pad);
    }
    let end = offset + data.len();
    if end > bytes.len() {
        bytes.resize(end, 0);
    }
    bytes[offset..end].copy_from_slice(data);

    let content = if was_text {
        match String::from_utf8(bytes) {
            Ok(s) => Content::Text(s),
            Err(e) => Content::Bytes(e.into_bytes()),
        }
    } else {
        Content::Bytes(bytes)
    };
    node.set_content(content);
    data.len()
}

/// Truncate or zero/space-pad to `len`.
pub(crate) fn truncate_node(node: &mut Node, len: usize) {
    let (mut bytes, was_text) = match node.content() {
        Some(Content::Text(s)) => (s.clone().into_bytes(), true),
        Some(Content::Bytes(b)) => (b.clone(), false),
        None => (Vec::new(), true),
    };
    if len <= bytes.len() {
        bytes.truncate(len);
    } else {
        let pad = if was_text { b' ' } else { 0u8 };
        bytes.resize(len, pad);
    }
    let content = if was_text {
        match String::from_utf8(bytes) {
            Ok(s) => Content::Text(s),
            Err(e) => Content::Bytes(e.into_bytes()),
        }
    } else {
        Content::Bytes(bytes)
    };
    node.set_content(content);
}

fn name_str(name: &OsStr) -> Option<String> {
    name.to_str().map(|s| s.to_string())
}

impl Filesystem for TouchFs {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name_str(name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let inner = &self.inner;
        let Some(path) = inner.child_path(parent, &name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match inner.store.find(&path) {
            Some(node) => {
                let ino = inner.ino_for(&path);
                reply.entry(&ENTRY_TTL, &inner.attr(ino, &node), 0);
            }
            None => reply.error(libc::ENOENT),
        }
    }

    /// Size computation may trigger generation. A failed generation never
    /// fails the stat: the file keeps its zero size and its tag, so a later
    /// read can retry.
    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let inner = self.inner.clone();
        self.dispatch(move || {
            let Some(path) = inner.path_of(ino) else {
                reply.error(libc::ENOENT);
                return;
            };
            if let Err(e) = inner.generate_if_needed(&path) {
                warn!(%path, error = %e, "generation_failed_during_stat");
            }
            match inner.store.find(&path) {
                Some(node) => reply.attr(&ATTR_TTL, &inner.attr(ino, &node)),
                None => reply.error(libc::ENOENT),
            }
        });
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let inner = &self.inner;
        let Some(path) = inner.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let result = inner.store.update(&path, |node| {
            if let Some(mode) = mode {
                node.mode = (node.mode & libc::S_IFMT) | (mode & 0o7777);
            }
            if let Some(uid) = uid {
                node.uid = Some(uid);
            }
            if let Some(gid) = gid {
                node.gid = Some(gid);
            }
            if let Some(size) = size {
                truncate_node(node, size as usize);
            }
            let to_secs = |t: TimeOrNow| match t {
                TimeOrNow::Now => now_secs(),
                TimeOrNow::SpecificTime(st) => st
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0),
            };
            if let Some(atime) = atime {
                node.times.atime = to_secs(atime);
            }
            if let Some(mtime) = mtime {
                node.times.mtime = to_secs(mtime);
            }
        });
        match result {
            Ok(()) => match inner.store.find(&path) {
                Some(node) => reply.attr(&ATTR_TTL, &inner.attr(ino, &node)),
                None => reply.error(libc::ENOENT),
            },
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let inner = &self.inner;
        let Some(path) = inner.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(node) = inner.store.find(&path) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(children) = node.children() else {
            reply.error(libc::ENOTDIR);
            return;
        };

        let mut entries: Vec<(u64, FileType, String)> = Vec::with_capacity(children.len() + 2);
        entries.push((ino, FileType::Directory, ".".to_string()));
        let parent_ino = if path == "/" {
            ROOT_INO
        } else {
            inner.ino_for(&dirname(&path))
        };
        entries.push((parent_ino, FileType::Directory, "..".to_string()));
        for (name, child_path) in children {
            let kind = inner
                .store
                .with_node(child_path, |child| match &child.kind {
                    NodeKind::Directory { .. } => FileType::Directory,
                    NodeKind::Symlink { .. } => FileType::Symlink,
                    NodeKind::File { .. } => FileType::RegularFile,
                })
                .unwrap_or(FileType::RegularFile);
            entries.push((inner.ino_for(child_path), kind, name.clone()));
        }

        for (i, (entry_ino, kind, name)) in entries.iter().enumerate().skip(offset as usize) {
            if reply.add(*entry_ino, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        let inner = self.inner.clone();
        self.dispatch(move || {
            let Some(path) = inner.path_of(ino) else {
                reply.error(libc::ENOENT);
                return;
            };
            let Some(node) = inner.store.find(&path) else {
                reply.error(libc::ENOENT);
                return;
            };
            if node.is_dir() {
                reply.error(libc::EISDIR);
                return;
            }

            let wants = needs_generation(&path, &node);
            if wants {
                if let Err(e) = inner.engine.generate(&inner.store, &path) {
                    warn!(%path, error = %e, "generation_failed_during_open");
                    reply.error(e.errno());
                    return;
                }
            }

            let fh = inner.alloc_fh(&path);
            // Direct IO where the size the kernel cached may already be
            // stale: proc overlays change on every read, and a file we just
            // materialized grew behind the kernel's back.
            let flags = if is_proc_path(&path) || wants {
                fuser::consts::FOPEN_DIRECT_IO
            } else {
                0
            };
            reply.opened(fh, flags);
        });
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let inner = self.inner.clone();
        self.dispatch(move || {
            let path = match inner.handle_path(fh).or_else(|| inner.path_of(ino)) {
                Some(p) => p,
                None => {
                    reply.error(libc::EBADF);
                    return;
                }
            };
            // Proc overlays regenerate on every read; ordinary tagged files
            // generate here if open somehow skipped it.
            if let Err(e) = inner.generate_if_needed(&path) {
                warn!(%path, error = %e, "generation_failed_during_read");
                reply.error(e.errno());
                return;
            }
            let content = inner
                .store
                .with_node(&path, |node| node.content().cloned());
            match content {
                Some(content) => {
                    let bytes = content.map(|c| c.as_bytes().to_vec()).unwrap_or_default();
                    let start = (offset.max(0) as usize).min(bytes.len());
                    let end = start.saturating_add(size as usize).min(bytes.len());
                    reply.data(&bytes[start..end]);
                }
                None => reply.error(libc::ENOENT),
            }
        });
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let inner = &self.inner;
        let path = match inner.handle_path(fh).or_else(|| inner.path_of(ino)) {
            Some(p) => p,
            None => {
                reply.error(libc::EBADF);
                return;
            }
        };
        let proc = is_proc_path(&path);
        let result = inner.store.update(&path, |node| {
            if !node.is_file() {
                return None;
            }
            let written = write_to_node(node, data, offset.max(0) as usize);
            // A user write claims the file; proc overlays keep their tags so
            // the owning plugin interprets the payload on the next read.
            if !proc {
                node.xattrs.remove(XATTR_GENERATE_CONTENT);
            }
            Some(written)
        });
        match result {
            Ok(Some(written)) => {
                debug!(%path, written, "write");
                reply.written(written as u32);
            }
            Ok(None) => reply.error(libc::EISDIR),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let inner = &self.inner;
        let Some(name) = name_str(name) else {
            reply.error(libc::EINVAL);
            return;
        };
        let Some(path) = inner.child_path(parent, &name) else {
            reply.error(libc::ENOENT);
            return;
        };

        let mut node = Node::file(mode);
        // Advisory heuristic: a create issued by a touch-family process
        // working inside the mount marks the file for generation.
        if procs::touch_cwd_under(&inner.mount_point).is_some() {
            debug!(%path, "touch_detected");
            node.xattrs
                .insert(XATTR_GENERATE_CONTENT.to_string(), b"true".to_vec());
        }

        match inner.store.insert(&path, node) {
            Ok(()) | Err(StoreError::Exists) => {
                let Some(node) = inner.store.find(&path) else {
                    reply.error(libc::ENOENT);
                    return;
                };
                let ino = inner.ino_for(&path);
                let fh = inner.alloc_fh(&path);
                reply.created(&ENTRY_TTL, &inner.attr(ino, &node), 0, fh, 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let inner = &self.inner;
        let Some(name) = name_str(name) else {
            reply.error(libc::EINVAL);
            return;
        };
        let Some(path) = inner.child_path(parent, &name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match inner.store.insert(&path, Node::directory(mode)) {
            Ok(()) => {
                let ino = inner.ino_for(&path);
                let node = inner.store.find(&path).expect("just inserted");
                reply.entry(&ENTRY_TTL, &inner.attr(ino, &node), 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let inner = &self.inner;
        let Some(name) = name_str(name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(path) = inner.child_path(parent, &name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match inner.store.find(&path) {
            None => reply.error(libc::ENOENT),
            Some(node) if node.is_dir() => reply.error(libc::EISDIR),
            Some(_) => match inner.store.remove(&path) {
                Ok(_) => {
                    inner.inodes.lock().expect("inode table poisoned").remove(&path);
                    reply.ok();
                }
                Err(e) => reply.error(e.errno()),
            },
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let inner = &self.inner;
        let Some(name) = name_str(name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(path) = inner.child_path(parent, &name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match inner.store.find(&path) {
            None => reply.error(libc::ENOENT),
            Some(node) if !node.is_dir() => reply.error(libc::ENOTDIR),
            Some(_) => match inner.store.remove(&path) {
                Ok(_) => {
                    inner.inodes.lock().expect("inode table poisoned").remove(&path);
                    reply.ok();
                }
                Err(e) => reply.error(e.errno()),
            },
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let inner = &self.inner;
        let (Some(name), Some(newname)) = (name_str(name), name_str(newname)) else {
            reply.error(libc::EINVAL);
            return;
        };
        let (Some(old), Some(new)) = (
            inner.child_path(parent, &name),
            inner.child_path(newparent, &newname),
        ) else {
            reply.error(libc::ENOENT);
            return;
        };
        match inner.store.rename(&old, &new) {
            Ok(()) => {
                inner
                    .inodes
                    .lock()
                    .expect("inode table poisoned")
                    .rename(&old, &new);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let inner = &self.inner;
        let Some(name) = name_str(link_name) else {
            reply.error(libc::EINVAL);
            return;
        };
        let Some(path) = inner.child_path(parent, &name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let node = Node::symlink(target.to_string_lossy().into_owned());
        match inner.store.insert(&path, node) {
            Ok(()) => {
                let ino = inner.ino_for(&path);
                let node = inner.store.find(&path).expect("just inserted");
                reply.entry(&ENTRY_TTL, &inner.attr(ino, &node), 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        let inner = &self.inner;
        let Some(path) = inner.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let target = inner.store.with_node(&path, |node| match &node.kind {
            NodeKind::Symlink { target } => Some(target.clone()),
            _ => None,
        });
        match target {
            Some(Some(target)) => reply.data(target.as_bytes()),
            Some(None) => reply.error(libc::EINVAL),
            None => reply.error(libc::ENOENT),
        }
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        reply.statfs(4096, 2048, 2048, 0, 0, BLOCK_SIZE, 255, 0);
    }

    fn setxattr(
        &mut self,
        _req: &Request,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let inner = &self.inner;
        let (Some(path), Some(name)) = (inner.path_of(ino), name_str(name)) else {
            reply.error(libc::ENOENT);
            return;
        };
        match inner.store.set_xattr(&path, &name, value) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getxattr(
        &mut self,
        _req: &Request,
        ino: u64,
        name: &OsStr,
        size: u32,
        reply: ReplyXattr,
    ) {
        let inner = &self.inner;
        let (Some(path), Some(name)) = (inner.path_of(ino), name_str(name)) else {
            reply.error(libc::ENOENT);
            return;
        };
        match inner.store.get_xattr(&path, &name) {
            Err(e) => reply.error(e.errno()),
            Ok(None) => reply.error(libc::ENODATA),
            Ok(Some(value)) => {
                if size == 0 {
                    reply.size(value.len() as u32);
                } else if (size as usize) < value.len() {
                    reply.error(libc::ERANGE);
                } else {
                    reply.data(&value);
                }
            }
        }
    }

    fn listxattr(&mut self, _req: &Request, ino: u64, size: u32, reply: ReplyXattr) {
        let inner = &self.inner;
        let Some(path) = inner.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match inner.store.list_xattr(&path) {
            Err(e) => reply.error(e.errno()),
            Ok(names) => {
                let mut buf = Vec::new();
                for name in names {
                    buf.extend_from_slice(name.as_bytes());
                    buf.push(0);
                }
                if size == 0 {
                    reply.size(buf.len() as u32);
                } else if (size as usize) < buf.len() {
                    reply.error(libc::ERANGE);
                } else {
                    reply.data(&buf);
                }
            }
        }
    }

    fn removexattr(&mut self, _req: &Request, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let inner = &self.inner;
        let (Some(path), Some(name)) = (inner.path_of(ino), name_str(name)) else {
            reply.error(libc::ENOENT);
            return;
        };
        match inner.store.remove_xattr(&path, &name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.inner
            .handles
            .lock()
            .expect("handle table poisoned")
            .remove(&fh);
        reply.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_writes_pad_with_spaces() {
        let mut node = Node::file(0o644);
        node.set_content(Content::Text("ab".into()));
        let written = write_to_node(&mut node, b"XY", 5);
        assert_eq!(written, 2);
        assert_eq!(node.content(), Some(&Content::Text("ab   XY".into())));
    }

    #[test]
    fn binary_writes_pad_with_nul() {
        let mut node = Node::file(0o644);
        node.set_content(Content::Bytes(vec![1, 2]));
        write_to_node(&mut node, &[9], 4);
        assert_eq!(
            node.content(),
            Some(&Content::Bytes(vec![1, 2, 0, 0, 9]))
        );
    }

    #[test]
    fn non_utf8_write_demotes_text_to_bytes() {
        let mut node = Node::file(0o644);
        node.set_content(Content::Text("abc".into()));
        write_to_node(&mut node, &[0xFF, 0xFE], 1);
        assert_eq!(
            node.content(),
            Some(&Content::Bytes(vec![b'a', 0xFF, 0xFE]))
        );
    }

    #[test]
    fn write_then_read_roundtrips() {
        let mut node = Node::file(0o644);
        write_to_node(&mut node, b"hello world", 0);
        assert_eq!(node.size(), 11);
        assert_eq!(
            node.content().unwrap().as_bytes(),
            b"hello world".as_slice()
        );
    }

    #[test]
    fn truncate_grows_and_shrinks() {
        let mut node = Node::file(0o644);
        node.set_content(Content::Text("hello".into()));
        truncate_node(&mut node, 2);
        assert_eq!(node.content(), Some(&Content::Text("he".into())));
        truncate_node(&mut node, 4);
        assert_eq!(node.content(), Some(&Content::Text("he  ".into())));

        let mut node = Node::file(0o644);
        node.set_content(Content::Bytes(vec![7]));
        truncate_node(&mut node, 3);
        assert_eq!(node.content(), Some(&Content::Bytes(vec![7, 0, 0])));
    }

    #[test]
    fn attrs_reflect_kind_and_mode() {
        let node = Node::directory(0o755);
        let attr = node_attr(1, &node, 1000, 1000);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.perm, 0o755);
        assert_eq!(attr.nlink, 2);
        assert_eq!(attr.size, 0);

        let mut node = Node::file(0o644);
        node.set_content(Content::Text("12345".into()));
        let attr = node_attr(2, &node, 1000, 1000);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.size, 5);
        assert_eq!(attr.blocks, 1);
        assert_eq!(attr.nlink, 1);
    }
}
