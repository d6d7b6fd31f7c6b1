// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Script engine selection.

use gantry_sandbox::{NoOpEngine, ScriptEngine};
use std::sync::Arc;

/// Resolve a configured engine name. `noop` is the in-tree smoke engine;
/// anything else must be provided by an embedding.
pub fn engine_by_name(name: &str) -> anyhow::Result<Arc<dyn ScriptEngine>> {
    match name {
        "noop" => Ok(Arc::new(NoOpEngine)),
        other => anyhow::bail!(
            "unknown script engine {other:?}: this build ships only \"noop\"; \
             embed gantry as a library to register another engine"
        ),
    }
}
