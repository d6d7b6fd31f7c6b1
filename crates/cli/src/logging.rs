// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Root-process logging setup.

use gantry_core::RunConfig;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Rotate the run log when it crosses this size.
const MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;

/// Keeps the non-blocking file writer alive for the process lifetime.
pub struct LogGuard {
    _file_guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Install the root subscriber: human-readable stderr plus an append-only
/// run log under the log directory. Filter via `GANTRY_LOG`.
pub fn init(config: &RunConfig) -> anyhow::Result<(LogGuard, PathBuf)> {
    let log_dir = config
        .log_dir
        .clone()
        .unwrap_or_else(|| crate::config::default_state_dir().join("logs"));
    std::fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join("run.log");
    rotate_log_if_needed(&log_path);

    let file_appender = tracing_appender::rolling::never(&log_dir, "run.log");
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_env("GANTRY_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .try_init()
        .ok();

    Ok((
        LogGuard {
            _file_guard: file_guard,
        },
        log_path,
    ))
}

/// Rename an oversized log to `.old` so the run starts on a small file.
fn rotate_log_if_needed(path: &Path) {
    let Ok(metadata) = std::fs::metadata(path) else {
        return;
    };
    if metadata.len() > MAX_LOG_SIZE {
        let rotated = path.with_extension("log.old");
        if let Err(e) = std::fs::rename(path, &rotated) {
            eprintln!("warning: failed to rotate log {}: {}", path.display(), e);
        }
    }
}
