// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Types exchanged with the root-owned FS-store.

use crate::LockToken;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Resource class a stored file belongs to. Concurrency is bounded per
/// class; classes do not block each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileClass {
    Text,
    Binary,
    Screenshot,
}

impl FileClass {
    pub const ALL: [FileClass; 3] = [FileClass::Text, FileClass::Binary, FileClass::Screenshot];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileClass::Text => "text",
            FileClass::Binary => "binary",
            FileClass::Screenshot => "screenshot",
        }
    }

    /// Default file extension for the class, used when the hint names none.
    pub fn default_ext(&self) -> &'static str {
        match self {
            FileClass::Text => "txt",
            FileClass::Binary => "bin",
            FileClass::Screenshot => "png",
        }
    }
}

impl std::fmt::Display for FileClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied naming hint for an acquisition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl FileHint {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            ext: None,
            name: Some(name.into()),
        }
    }

    pub fn with_ext(mut self, ext: impl Into<String>) -> Self {
        self.ext = Some(ext.into());
        self
    }
}

/// A granted path reservation. Owned by the requesting worker until
/// released, deleted, or the worker exits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreHandle {
    pub full_path: PathBuf,
    pub ext: String,
    pub name: String,
    pub class: FileClass,
    pub lock_token: LockToken,
}

/// Point-in-time metadata for a reserved path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub full_path: PathBuf,
    pub exists: bool,
    pub size: u64,
}

/// Kind tag for store faults carried over the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsErrorKind {
    /// The store server has been torn down.
    Closed,
    /// The lock token is not held by anyone.
    UnknownLock,
    /// Underlying filesystem failure.
    Io,
}

/// Store fault, serializable so it can cross the process boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("fs-store {kind:?}: {message}")]
pub struct FsError {
    pub kind: FsErrorKind,
    pub message: String,
}

impl FsError {
    pub fn closed() -> Self {
        Self {
            kind: FsErrorKind::Closed,
            message: "store is closed".to_string(),
        }
    }

    pub fn unknown_lock(token: &LockToken) -> Self {
        Self {
            kind: FsErrorKind::UnknownLock,
            message: format!("unknown lock token: {token}"),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self {
            kind: FsErrorKind::Io,
            message: message.into(),
        }
    }
}
