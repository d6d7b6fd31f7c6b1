// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filename generation and collision disambiguation.

use gantry_core::{FileClass, FileHint};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Hook point producing the candidate filename for an acquisition. The
/// chained payload carries `owner`, `timestamp`, `class`, `hint`, and the
/// default `filename`; callbacks may replace `filename`.
pub const FILENAME_HOOK: &str = "store:filename";

/// Default candidate name from the acquisition context.
pub fn default_filename(owner: &str, timestamp: u64, class: FileClass, hint: &FileHint) -> String {
    let stem = match &hint.name {
        Some(name) => name.clone(),
        None => format!("{owner}-{timestamp}"),
    };
    let ext = hint
        .ext
        .clone()
        .unwrap_or_else(|| class.default_ext().to_string());
    format!("{stem}.{ext}")
}

/// Resolve `filename` under `root` to a path unique both on disk and
/// against `reserved`, appending a monotonically increasing disambiguator
/// until it is.
pub fn unique_path(root: &Path, filename: &str, reserved: &HashSet<PathBuf>) -> PathBuf {
    let candidate = root.join(filename);
    if is_free(&candidate, reserved) {
        return candidate;
    }

    let (stem, ext) = match filename.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), Some(ext.to_string())),
        None => (filename.to_string(), None),
    };
    let mut counter = 1u64;
    loop {
        let next = match &ext {
            Some(ext) => format!("{stem}-{counter}.{ext}"),
            None => format!("{stem}-{counter}"),
        };
        let candidate = root.join(next);
        if is_free(&candidate, reserved) {
            return candidate;
        }
        counter += 1;
    }
}

fn is_free(candidate: &Path, reserved: &HashSet<PathBuf>) -> bool {
    !reserved.contains(candidate) && !candidate.exists()
}

#[cfg(test)]
#[path = "naming_tests.rs"]
mod tests;
