// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config resolution: `gantry.toml`, environment overlay, CLI flags.

use anyhow::Context;
use gantry_core::{RunConfig, RunConfigOverlay};
use std::path::{Path, PathBuf};

use crate::run::RunArgs;

/// Default project config file looked up in the working directory.
const DEFAULT_CONFIG: &str = "gantry.toml";

/// Project-local output root used when the config names none.
pub fn default_state_dir() -> PathBuf {
    PathBuf::from(".gantry")
}

/// Load the effective run configuration. Precedence, lowest to highest:
/// defaults, `gantry.toml` (or `--config`), `--env-config` overlay, flags.
pub fn load(args: &RunArgs) -> anyhow::Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG);
            if default.is_file() {
                read_config(default)?
            } else {
                RunConfig::default()
            }
        }
    };

    if let Some(env_path) = &args.env_config {
        let text = std::fs::read_to_string(env_path)
            .with_context(|| format!("failed to read env config {}", env_path.display()))?;
        let overlay = RunConfigOverlay::from_toml_str(&text)
            .with_context(|| format!("failed to parse env config {}", env_path.display()))?;
        overlay.apply(&mut config);
    }

    if let Some(tests) = &args.tests {
        config.tests = Some(tests.clone());
    }
    if !args.plugins.is_empty() {
        config.plugins = args.plugins.clone();
    }
    if let Some(worker_limit) = args.worker_limit {
        config.worker_limit = worker_limit;
    }
    if let Some(retry_count) = args.retry_count {
        config.retry_count = retry_count;
    }
    if let Some(retry_delay) = args.retry_delay {
        config.retry_delay_ms = retry_delay;
    }
    if args.bail {
        config.bail = true;
    }
    if let Some(test_timeout) = args.test_timeout {
        config.test_timeout_ms = test_timeout;
    }
    if args.debug {
        config.debug = true;
    }

    Ok(config)
}

fn read_config(path: &Path) -> anyhow::Result<RunConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    RunConfig::from_toml_str(&text)
        .with_context(|| format!("failed to parse config {}", path.display()))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
