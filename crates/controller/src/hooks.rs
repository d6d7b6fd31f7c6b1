// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller hook surface.
//!
//! All extension points are named hooks whose callbacks receive the
//! current payload and return a (possibly modified) payload. Veto-style
//! hooks set `veto: true` on the chained payload.

use gantry_core::{HookPayload, HookRegistry};

pub const BEFORE_RUN: &str = "before-run";
pub const AFTER_RUN: &str = "after-run";
pub const BEFORE_TEST: &str = "before-test";
pub const AFTER_TEST: &str = "after-test";
pub const BEFORE_RETRY: &str = "before-retry";
pub const SHOULD_NOT_START: &str = "should-not-start";
pub const SHOULD_NOT_RETRY: &str = "should-not-retry";

/// Run a hook chain, swallowing callback failures: a broken plugin must
/// not take the dispatch loop down. Returns the chained payload.
pub async fn call(registry: &HookRegistry, name: &str, payload: HookPayload) -> HookPayload {
    match registry.call_hook(name, payload.clone()).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(hook = name, error = %e, "hook chain failed");
            payload
        }
    }
}

/// Run a veto-style hook: true when any callback set `veto: true`.
pub async fn vetoed(registry: &HookRegistry, name: &str, payload: HookPayload) -> bool {
    let result = call(registry, name, payload).await;
    result
        .get("veto")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "hooks_tests.rs"]
mod tests;
