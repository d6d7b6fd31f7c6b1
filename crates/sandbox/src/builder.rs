// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency dictionary builder.
//!
//! Walks `require` references from an entry file and materializes the flat
//! closed dictionary. An identity cache (the dictionary itself) is
//! installed before recursing into a file, which terminates cycles and
//! self-requires without re-reading anything.

use crate::error::SandboxError;
use crate::resolve::{normalize, resolve_request, Resolution, ResolverConfig};
use crate::scan::scan_requires;
use gantry_core::{DependencyDict, FileNode};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Read capability the builder walks the source tree with.
pub trait SourceReader: Send + Sync {
    fn read(&self, path: &Path) -> std::io::Result<String>;
    fn exists(&self, path: &Path) -> bool;
}

/// Production reader backed by the filesystem.
#[derive(Debug, Clone, Default)]
pub struct FsReader;

impl SourceReader for FsReader {
    fn read(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// In-memory reader for tests and pre-loaded sources.
#[derive(Debug, Clone, Default)]
pub struct MapReader {
    files: HashMap<PathBuf, String>,
}

impl MapReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> &mut Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

impl SourceReader for MapReader {
    fn read(&self, path: &Path) -> std::io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }
}

/// Builds the closed dependency dictionary for a test entry.
pub struct DependencyBuilder<R: SourceReader> {
    reader: R,
    config: ResolverConfig,
}

impl<R: SourceReader> DependencyBuilder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            config: ResolverConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the dictionary for `entry_path` whose content is already in
    /// hand. Every transitively required user file is read through the
    /// reader; host-supplied requests are left out of the dictionary.
    pub fn build(
        &self,
        entry_path: &Path,
        entry_content: &str,
    ) -> Result<DependencyDict, SandboxError> {
        let mut dict = DependencyDict::new();
        let entry = normalize(entry_path);
        self.visit(&entry, entry_content.to_string(), &mut dict)?;
        Ok(dict)
    }

    fn visit(
        &self,
        path: &Path,
        content: String,
        dict: &mut DependencyDict,
    ) -> Result<(), SandboxError> {
        let path_str = path.to_string_lossy().to_string();

        // Install the node before scanning so cycles and self-requires
        // terminate against the cache.
        dict.insert(path_str.clone(), FileNode::new(content.clone()));

        let requests = scan_requires(&content).map_err(|e| SandboxError::Parse {
            path: path_str.clone(),
            detail: e.to_string(),
        })?;

        for request in requests {
            let resolution = resolve_request(path, &request, &self.config, &|p| {
                self.reader.exists(p) || dict.contains(&p.to_string_lossy())
            });
            match resolution {
                Resolution::Host => {}
                Resolution::NotFound => {
                    return Err(SandboxError::Resolution {
                        request,
                        parent: path_str,
                    });
                }
                Resolution::User(target) => {
                    let target_str = target.to_string_lossy().to_string();
                    dict.add_request(&path_str, request, target_str.clone());
                    if !dict.contains(&target_str) {
                        let content =
                            self.reader.read(&target).map_err(|e| SandboxError::Read {
                                path: target_str.clone(),
                                source: e,
                            })?;
                        self.visit(&target, content, dict)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
