// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! In-memory node store: a flat path index plus per-directory child maps.
//!
//! The flat index is authoritative; child maps mirror it and every mutating
//! operation maintains both sides. Single operations are linearizable (one
//! reader-writer lock around the index); composite flows such as generation
//! are serialized by the callers that own them.

mod error;
mod node;

pub use error::StoreError;
pub use node::{
    now_secs, Content, Node, NodeKind, Times, XATTR_GENERATE_CONTENT, XATTR_GENERATOR,
};

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Lexically normalize a path to an absolute form without `.`/`..`/empty
/// components. Relative input is interpreted from `/`.
pub fn normalize(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            c => stack.push(c),
        }
    }
    if stack.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", stack.join("/"))
    }
}

pub fn dirname(path: &str) -> String {
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(i) => path[..i].to_string(),
        None => "/".to_string(),
    }
}

pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

/// True when `path` is already an absolute, normalized POSIX path.
pub fn is_normalized(path: &str) -> bool {
    if !path.starts_with('/') {
        return false;
    }
    path == "/" || normalize(path) == path
}

/// Concurrent in-memory tree keyed by absolute normalized path.
#[derive(Debug)]
pub struct NodeStore {
    inner: RwLock<BTreeMap<String, Node>>,
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeStore {
    pub fn new() -> Self {
        let mut map = BTreeMap::new();
        map.insert("/".to_string(), Node::directory(0o755));
        NodeStore {
            inner: RwLock::new(map),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        let map = self.inner.read().expect("store lock poisoned");
        map.contains_key(&normalize(path))
    }

    /// Normalized lookup; clones the node out of the index.
    pub fn find(&self, path: &str) -> Option<Node> {
        let map = self.inner.read().expect("store lock poisoned");
        map.get(&normalize(path)).cloned()
    }

    /// Read access without cloning content.
    pub fn with_node<R>(&self, path: &str, f: impl FnOnce(&Node) -> R) -> Option<R> {
        let map = self.inner.read().expect("store lock poisoned");
        map.get(&normalize(path)).map(f)
    }

    /// Apply a mutation to one node. Mutations that change content are the
    /// caller's cue to update mtime via `Node::set_content`.
    pub fn update<R>(
        &self,
        path: &str,
        f: impl FnOnce(&mut Node) -> R,
    ) -> Result<R, StoreError> {
        let mut map = self.inner.write().expect("store lock poisoned");
        map.get_mut(&normalize(path))
            .map(f)
            .ok_or(StoreError::NotFound)
    }

    /// Insert a node; the parent must already exist and be a directory.
    pub fn insert(&self, path: &str, node: Node) -> Result<(), StoreError> {
        let path = normalize(path);
        if path == "/" {
            return Err(StoreError::Exists);
        }
        let mut map = self.inner.write().expect("store lock poisoned");
        if map.contains_key(&path) {
            return Err(StoreError::Exists);
        }
        let parent = dirname(&path);
        match map.get(&parent) {
            None => return Err(StoreError::NotFound),
            Some(n) if !n.is_dir() => return Err(StoreError::NotDirectory),
            Some(_) => {}
        }
        let name = basename(&path).to_string();
        map.insert(path.clone(), node);
        if let Some(NodeKind::Directory { children }) = map.get_mut(&parent).map(|n| &mut n.kind)
        {
            children.insert(name, path);
        }
        Ok(())
    }

    /// Create `path` and any missing ancestors as 0755 directories.
    pub fn ensure_dir_all(&self, path: &str) -> Result<(), StoreError> {
        let path = normalize(path);
        if path == "/" {
            return Ok(());
        }
        let mut prefix = String::new();
        for comp in path.split('/').filter(|c| !c.is_empty()) {
            prefix.push('/');
            prefix.push_str(comp);
            match self.find(&prefix) {
                Some(n) if n.is_dir() => {}
                Some(_) => return Err(StoreError::NotDirectory),
                None => self.insert(&prefix, Node::directory(0o755))?,
            }
        }
        Ok(())
    }

    /// Remove a node; fails with `NotEmpty` for non-empty directories.
    /// The root is never removable.
    pub fn remove(&self, path: &str) -> Result<Node, StoreError> {
        let path = normalize(path);
        if path == "/" {
            return Err(StoreError::NotEmpty);
        }
        let mut map = self.inner.write().expect("store lock poisoned");
        match map.get(&path) {
            None => return Err(StoreError::NotFound),
            Some(n) => {
                if let Some(children) = n.children() {
                    if !children.is_empty() {
                        return Err(StoreError::NotEmpty);
                    }
                }
            }
        }
        let node = map.remove(&path).expect("checked above");
        let parent = dirname(&path);
        if let Some(NodeKind::Directory { children }) = map.get_mut(&parent).map(|n| &mut n.kind)
        {
            children.remove(basename(&path));
        }
        Ok(node)
    }

    /// Atomic re-link of the index entry and both parent references. Renaming
    /// a directory rewrites the whole subtree so the flat index stays
    /// authoritative.
    pub fn rename(&self, old: &str, new: &str) -> Result<(), StoreError> {
        let old = normalize(old);
        let new = normalize(new);
        if old == "/" || new == "/" || old == new {
            return Err(StoreError::Exists);
        }
        let mut map = self.inner.write().expect("store lock poisoned");
        if !map.contains_key(&old) {
            return Err(StoreError::NotFound);
        }
        let new_parent = dirname(&new);
        match map.get(&new_parent) {
            None => return Err(StoreError::NotFound),
            Some(n) if !n.is_dir() => return Err(StoreError::NotDirectory),
            Some(_) => {}
        }
        if let Some(existing) = map.get(&new) {
            if let Some(children) = existing.children() {
                if !children.is_empty() {
                    return Err(StoreError::NotEmpty);
                }
            }
            // Replaced targets are dropped, matching rename(2) overwrite.
        }

        let subtree_prefix = format!("{old}/");
        let moved: Vec<String> = map
            .keys()
            .filter(|k| *k == &old || k.starts_with(&subtree_prefix))
            .cloned()
            .collect();

        let old_parent = dirname(&old);
        if let Some(NodeKind::Directory { children }) =
            map.get_mut(&old_parent).map(|n| &mut n.kind)
        {
            children.remove(basename(&old));
        }

        map.remove(&new);
        for key in moved {
            let mut node = map.remove(&key).expect("collected from index");
            if let NodeKind::Directory { children } = &mut node.kind {
                for child_path in children.values_mut() {
                    *child_path = rewrite_prefix(child_path, &old, &new);
                }
            }
            let new_key = rewrite_prefix(&key, &old, &new);
            map.insert(new_key, node);
        }
        let name = basename(&new).to_string();
        if let Some(NodeKind::Directory { children }) =
            map.get_mut(&new_parent).map(|n| &mut n.kind)
        {
            children.insert(name, new);
        }
        Ok(())
    }

    pub fn set_xattr(&self, path: &str, name: &str, value: &[u8]) -> Result<(), StoreError> {
        self.update(path, |n| {
            n.xattrs.insert(name.to_string(), value.to_vec());
        })
    }

    pub fn get_xattr(&self, path: &str, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.with_node(path, |n| n.xattrs.get(name).cloned())
            .ok_or(StoreError::NotFound)
    }

    pub fn list_xattr(&self, path: &str) -> Result<Vec<String>, StoreError> {
        self.with_node(path, |n| n.xattrs.keys().cloned().collect())
            .ok_or(StoreError::NotFound)
    }

    pub fn remove_xattr(&self, path: &str, name: &str) -> Result<(), StoreError> {
        self.update(path, |n| {
            n.xattrs.remove(name);
        })
    }

    /// Every path currently in the index, sorted.
    pub fn paths(&self) -> Vec<String> {
        let map = self.inner.read().expect("store lock poisoned");
        map.keys().cloned().collect()
    }

    /// JSON view of the tree for plugins and fingerprints.
    ///
    /// Excludes times, nlink, and size so the view is stable while the tree
    /// shape and contents are unchanged. Binary content is elided to `null`.
    pub fn serialize_public(&self) -> Value {
        let map = self.inner.read().expect("store lock poisoned");
        let mut out = Map::new();
        for (path, node) in map.iter() {
            let mut entry = Map::new();
            match &node.kind {
                NodeKind::File { content } => {
                    entry.insert("type".into(), json!("file"));
                    let text = match content {
                        Some(Content::Text(s)) => Value::String(s.clone()),
                        _ => Value::Null,
                    };
                    entry.insert("content".into(), text);
                }
                NodeKind::Directory { children } => {
                    entry.insert("type".into(), json!("directory"));
                    entry.insert(
                        "children".into(),
                        Value::Object(
                            children
                                .iter()
                                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                                .collect(),
                        ),
                    );
                }
                NodeKind::Symlink { target } => {
                    entry.insert("type".into(), json!("symlink"));
                    entry.insert("target".into(), json!(target));
                }
            }
            entry.insert("mode".into(), json!(node.mode));
            if let Some(uid) = node.uid {
                entry.insert("uid".into(), json!(uid));
            }
            if let Some(gid) = node.gid {
                entry.insert("gid".into(), json!(gid));
            }
            if !node.xattrs.is_empty() {
                entry.insert(
                    "xattrs".into(),
                    Value::Object(
                        node.xattrs
                            .iter()
                            .map(|(k, v)| {
                                (k.clone(), Value::String(String::from_utf8_lossy(v).into()))
                            })
                            .collect(),
                    ),
                );
            }
            out.insert(path.clone(), Value::Object(entry));
        }
        Value::Object(out)
    }
}

fn rewrite_prefix(path: &str, old: &str, new: &str) -> String {
    if path == old {
        new.to_string()
    } else if let Some(rest) = path.strip_prefix(old) {
        format!("{new}{rest}")
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(paths: &[&str]) -> NodeStore {
        let store = NodeStore::new();
        for p in paths {
            store.ensure_dir_all(&dirname(p)).unwrap();
            store.insert(p, Node::file(0o644)).unwrap();
        }
        store
    }

    fn assert_parent_links(store: &NodeStore) {
        for p in store.paths() {
            if p == "/" {
                continue;
            }
            let parent = store.find(&dirname(&p)).expect("parent exists");
            let children = parent.children().expect("parent is a directory");
            assert_eq!(children.get(basename(&p)), Some(&p));
        }
    }

    #[test]
    fn normalize_collapses_components() {
        assert_eq!(normalize("/a//b/./c/../d"), "/a/b/d");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("/a/"), "/a");
    }

    #[test]
    fn insert_requires_directory_parent() {
        let store = NodeStore::new();
        assert_eq!(
            store.insert("/missing/file", Node::file(0o644)),
            Err(StoreError::NotFound)
        );
        store.insert("/f", Node::file(0o644)).unwrap();
        assert_eq!(
            store.insert("/f/child", Node::file(0o644)),
            Err(StoreError::NotDirectory)
        );
    }

    #[test]
    fn remove_nonempty_directory_fails_and_keeps_tree() {
        let store = store_with(&["/d/f"]);
        assert_eq!(store.remove("/d"), Err(StoreError::NotEmpty));
        assert!(store.contains("/d"));
        assert!(store.contains("/d/f"));
        store.remove("/d/f").unwrap();
        store.remove("/d").unwrap();
        assert!(!store.contains("/d"));
        assert_parent_links(&store);
    }

    #[test]
    fn rename_rewrites_directory_subtree() {
        let store = store_with(&["/src/a.py", "/src/pkg/b.py"]);
        store.rename("/src", "/lib").unwrap();
        assert!(!store.contains("/src"));
        assert!(store.contains("/lib/a.py"));
        assert!(store.contains("/lib/pkg/b.py"));
        let lib = store.find("/lib").unwrap();
        assert_eq!(
            lib.children().unwrap().get("pkg"),
            Some(&"/lib/pkg".to_string())
        );
        assert_parent_links(&store);
    }

    #[test]
    fn rename_refuses_overwriting_nonempty_directory() {
        let store = store_with(&["/a/f", "/b/g"]);
        assert_eq!(store.rename("/a", "/b"), Err(StoreError::NotEmpty));
        assert_parent_links(&store);
    }

    #[test]
    fn xattr_roundtrip() {
        let store = store_with(&["/f"]);
        store.set_xattr("/f", "generator", b"image").unwrap();
        assert_eq!(
            store.get_xattr("/f", "generator").unwrap(),
            Some(b"image".to_vec())
        );
        assert_eq!(store.list_xattr("/f").unwrap(), vec!["generator"]);
        store.remove_xattr("/f", "generator").unwrap();
        assert_eq!(store.get_xattr("/f", "generator").unwrap(), None);
    }

    #[test]
    fn size_is_derived_from_content() {
        let store = store_with(&["/f"]);
        assert_eq!(store.find("/f").unwrap().size(), 0);
        store
            .update("/f", |n| n.set_content(Content::Text("hello".into())))
            .unwrap();
        assert_eq!(store.find("/f").unwrap().size(), 5);
        store
            .update("/f", |n| n.set_content(Content::Bytes(vec![0u8; 7])))
            .unwrap();
        assert_eq!(store.find("/f").unwrap().size(), 7);
    }

    #[test]
    fn public_serialization_is_stable_and_excludes_times() {
        let store = store_with(&["/d/f"]);
        store
            .update("/d/f", |n| n.set_content(Content::Text("x".into())))
            .unwrap();
        let a = serde_json::to_string(&store.serialize_public()).unwrap();
        let b = serde_json::to_string(&store.serialize_public()).unwrap();
        assert_eq!(a, b);
        assert!(!a.contains("mtime"));
        assert!(!a.contains("size"));
    }

    #[test]
    fn wants_generation_reads_xattr() {
        let store = store_with(&["/f"]);
        assert!(!store.find("/f").unwrap().wants_generation());
        store.set_xattr("/f", XATTR_GENERATE_CONTENT, b"true").unwrap();
        assert!(store.find("/f").unwrap().wants_generation());
    }
}
