// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request resolution against the user source boundary.

use std::path::{Component, Path, PathBuf};

/// Resolution configuration. `platform_dir` is the single option naming the
/// platform package directory; anything resolving under it stays with the
/// host runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Extension candidates tried in order after the exact path.
    pub extensions: Vec<String>,
    /// Directory index file name tried when the request names a directory.
    pub index_name: String,
    /// Platform package directory token (e.g. `node_modules`).
    pub platform_dir: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            extensions: vec![".js".to_string(), ".json".to_string()],
            index_name: "index".to_string(),
            platform_dir: "node_modules".to_string(),
        }
    }
}

/// Where a request resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A user source file, part of the dependency closure.
    User(PathBuf),
    /// Outside the user source boundary: supplied by the host runtime.
    Host,
    /// Relative request with no matching file.
    NotFound,
}

/// Resolve `request` as written in the file at `parent`.
///
/// Bare requests (no leading `./`, `../`, or `/`) and anything under the
/// platform directory belong to the host. Relative and absolute requests
/// try the exact path, the configured extensions, then a directory index.
pub fn resolve_request(
    parent: &Path,
    request: &str,
    config: &ResolverConfig,
    exists: &dyn Fn(&Path) -> bool,
) -> Resolution {
    if !request.starts_with("./") && !request.starts_with("../") && !request.starts_with('/') {
        return Resolution::Host;
    }

    let base = if request.starts_with('/') {
        PathBuf::from(request)
    } else {
        let parent_dir = parent.parent().unwrap_or_else(|| Path::new("/"));
        parent_dir.join(request)
    };
    let base = normalize(&base);

    if under_platform_dir(&base, &config.platform_dir) {
        return Resolution::Host;
    }

    for candidate in candidates(&base, config) {
        if exists(&candidate) {
            return Resolution::User(candidate);
        }
    }
    Resolution::NotFound
}

fn candidates(base: &Path, config: &ResolverConfig) -> Vec<PathBuf> {
    let mut out = vec![base.to_path_buf()];
    if let Some(name) = base.file_name().and_then(|n| n.to_str()) {
        for ext in &config.extensions {
            out.push(base.with_file_name(format!("{name}{ext}")));
        }
    }
    for ext in &config.extensions {
        out.push(base.join(format!("{}{ext}", config.index_name)));
    }
    out
}

fn under_platform_dir(path: &Path, platform_dir: &str) -> bool {
    path.components()
        .any(|c| matches!(c, Component::Normal(n) if n == std::ffi::OsStr::new(platform_dir)))
}

/// Lexically normalize `.` and `..` components.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
