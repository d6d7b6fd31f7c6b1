// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[tokio::test]
async fn vetoed_reads_the_chained_flag() {
    let registry = HookRegistry::new();
    registry.get_hook(SHOULD_NOT_START).tap(|mut payload| async move {
        if payload["path"] == "/skip-me.js" {
            payload["veto"] = json!(true);
        }
        Ok(payload)
    });

    assert!(vetoed(&registry, SHOULD_NOT_START, json!({"path": "/skip-me.js", "veto": false})).await);
    assert!(!vetoed(&registry, SHOULD_NOT_START, json!({"path": "/run-me.js", "veto": false})).await);
}

#[tokio::test]
async fn unregistered_hooks_do_not_veto() {
    let registry = HookRegistry::new();
    assert!(!vetoed(&registry, SHOULD_NOT_RETRY, json!({"veto": false})).await);
}

#[tokio::test]
async fn failing_hook_is_swallowed_and_payload_kept() {
    let registry = HookRegistry::new();
    registry.get_hook(BEFORE_TEST).tap(|_| async move {
        Err(gantry_core::HookError::Callback("plugin exploded".to_string()))
    });

    let payload = json!({"path": "/t.js"});
    let out = call(&registry, BEFORE_TEST, payload.clone()).await;
    assert_eq!(out, payload, "dispatch must survive broken plugins");
}
