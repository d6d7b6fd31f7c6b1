// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flat dependency dictionary for a test entry's require closure.
//!
//! The dictionary maps absolute file paths to their content and to the
//! resolution of every `require` request found in that file. It is closed
//! under inclusion: every path a request resolves to is itself a key.
//! Cycles are represented by key aliasing, not by nesting.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One file in the dictionary: its source text plus the absolute path each
/// of its requests resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub content: String,
    /// request string -> absolute path (a key of the owning dictionary)
    #[serde(default)]
    pub requests: IndexMap<String, String>,
}

impl FileNode {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            requests: IndexMap::new(),
        }
    }
}

/// Violation of the closed-under-inclusion invariant.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("dependency dict not closed: {parent} resolves {request:?} to {target}, which is not a key")]
pub struct ClosureError {
    pub parent: String,
    pub request: String,
    pub target: String,
}

/// Flat, closed mapping from absolute path to [`FileNode`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyDict {
    files: IndexMap<String, FileNode>,
}

impl DependencyDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file node, replacing any existing entry for `path`.
    pub fn insert(&mut self, path: impl Into<String>, node: FileNode) {
        self.files.insert(path.into(), node);
    }

    /// Record that `parent` resolves `request` to `target`. No-op when the
    /// parent has no node yet.
    pub fn add_request(
        &mut self,
        parent: &str,
        request: impl Into<String>,
        target: impl Into<String>,
    ) {
        if let Some(node) = self.files.get_mut(parent) {
            node.requests.insert(request.into(), target.into());
        }
    }

    pub fn get(&self, path: &str) -> Option<&FileNode> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Resolve `request` as seen from the file at `parent`.
    pub fn resolve(&self, parent: &str, request: &str) -> Option<&str> {
        self.files
            .get(parent)
            .and_then(|node| node.requests.get(request))
            .map(String::as_str)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileNode)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Check the closure invariant: every request target is a key.
    pub fn verify_closed(&self) -> Result<(), ClosureError> {
        for (parent, node) in &self.files {
            for (request, target) in &node.requests {
                if !self.files.contains_key(target) {
                    return Err(ClosureError {
                        parent: parent.clone(),
                        request: request.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "dependency_tests.rs"]
mod tests;
