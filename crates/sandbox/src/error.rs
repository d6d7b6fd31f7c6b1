// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for dependency building and sandbox evaluation

use thiserror::Error;

/// Failures from building or evaluating a test's module graph.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// A `require` request could not be resolved while building the
    /// dependency dictionary.
    #[error("cannot resolve {request:?} from {parent}")]
    Resolution { request: String, parent: String },

    /// The source text could not be scanned for requires.
    #[error("failed to parse {path}: {detail}")]
    Parse { path: String, detail: String },

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A request missed both the dictionary and the host-native loader at
    /// evaluation time.
    #[error("sandbox resolution failed: {request:?} from {parent}")]
    RuntimeResolution { request: String, parent: String },

    /// The module body is not in the dictionary the sandbox was built on.
    #[error("module not in dependency dictionary: {path}")]
    UnknownModule { path: String },

    /// User code threw during evaluation.
    #[error("test failed: {0}")]
    TestFailed(String),
}

impl SandboxError {
    /// Path the failure originated in, when one is known.
    pub fn origin(&self) -> Option<&str> {
        match self {
            SandboxError::Resolution { parent, .. }
            | SandboxError::RuntimeResolution { parent, .. } => Some(parent),
            SandboxError::Parse { path, .. }
            | SandboxError::Read { path, .. }
            | SandboxError::UnknownModule { path } => Some(path),
            SandboxError::TestFailed(_) => None,
        }
    }
}
