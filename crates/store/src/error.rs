// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 Richard Majewski - Varanid Works

use std::error::Error as StdError;
use std::fmt;

/// Tree-level failures, mapped onto kernel errno values by the VFS adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Path absent.
    NotFound,
    /// Parent (or target of a directory operation) is not a directory.
    NotDirectory,
    /// Target is a directory where a file was required.
    IsDirectory,
    /// rmdir of a non-empty directory.
    NotEmpty,
    /// Target already exists.
    Exists,
}

impl StoreError {
    pub fn errno(&self) -> i32 {
        match self {
            StoreError::NotFound => libc::ENOENT,
            StoreError::NotDirectory => libc::ENOTDIR,
            StoreError::IsDirectory => libc::EISDIR,
            StoreError::NotEmpty => libc::ENOTEMPTY,
            StoreError::Exists => libc::EEXIST,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            StoreError::NotFound => "no such path",
            StoreError::NotDirectory => "not a directory",
            StoreError::IsDirectory => "is a directory",
            StoreError::NotEmpty => "directory not empty",
            StoreError::Exists => "path already exists",
        };
        f.write_str(msg)
    }
}

impl StdError for StoreError {}
