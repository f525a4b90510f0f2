// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

//! Inode-to-path mapping. The kernel speaks inodes; the store speaks paths.

use std::collections::HashMap;

pub const ROOT_INO: u64 = 1;

#[derive(Debug)]
pub struct InodeTable {
    by_ino: HashMap<u64, String>,
    by_path: HashMap<String, u64>,
    next: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    pub fn new() -> Self {
        let mut table = InodeTable {
            by_ino: HashMap::new(),
            by_path: HashMap::new(),
            next: ROOT_INO + 1,
        };
        table.by_ino.insert(ROOT_INO, "/".to_string());
        table.by_path.insert("/".to_string(), ROOT_INO);
        table
    }

    pub fn get_or_create(&mut self, path: &str) -> u64 {
        if let Some(ino) = self.by_path.get(path) {
            return *ino;
        }
        let ino = self.next;
        self.next += 1;
        self.by_ino.insert(ino, path.to_string());
        self.by_path.insert(path.to_string(), ino);
        ino
    }

    pub fn path_of(&self, ino: u64) -> Option<String> {
        self.by_ino.get(&ino).cloned()
    }

    /// Re-key a path (and, for directories, its whole subtree) after rename.
    pub fn rename(&mut self, old: &str, new: &str) {
        let prefix = format!("{old}/");
        let moved: Vec<(String, u64)> = self
            .by_path
            .iter()
            .filter(|(p, _)| *p == old || p.starts_with(&prefix))
            .map(|(p, i)| (p.clone(), *i))
            .collect();
        for (path, ino) in moved {
            self.by_path.remove(&path);
            let new_path = if path == old {
                new.to_string()
            } else {
                format!("{new}{}", &path[old.len()..])
            };
            self.by_ino.insert(ino, new_path.clone());
            self.by_path.insert(new_path, ino);
        }
    }

    pub fn remove(&mut self, path: &str) {
        if let Some(ino) = self.by_path.remove(path) {
            self.by_ino.remove(&ino);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_inode_one() {
        let table = InodeTable::new();
        assert_eq!(table.path_of(ROOT_INO).as_deref(), Some("/"));
    }

    #[test]
    fn allocation_is_stable_per_path() {
        let mut table = InodeTable::new();
        let a = table.get_or_create("/a");
        assert_eq!(table.get_or_create("/a"), a);
        assert_ne!(table.get_or_create("/b"), a);
    }

    #[test]
    fn rename_rekeys_the_subtree() {
        let mut table = InodeTable::new();
        let dir = table.get_or_create("/src");
        let file = table.get_or_create("/src/a.py");
        table.rename("/src", "/lib");
        assert_eq!(table.path_of(dir).as_deref(), Some("/lib"));
        assert_eq!(table.path_of(file).as_deref(), Some("/lib/a.py"));
        assert_eq!(table.get_or_create("/lib/a.py"), file);
    }
}
