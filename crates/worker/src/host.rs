// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single host object injected into each sandbox.

use crate::browser::BrowserProxy;
use gantry_core::SystemClock;
use gantry_logger::LogClient;
use gantry_sandbox::HostHandle;
use gantry_store::StoreClient;
use std::sync::Arc;

/// Everything a test can reach: the logger client, the store client, the
/// browser proxy, and its parameters. No other worker state leaks into
/// the sandbox.
#[derive(Clone)]
pub struct HostContext {
    /// Originating environment tag (the worker id).
    pub environment: String,
    pub parameters: serde_json::Value,
    pub env_parameters: serde_json::Value,
    pub logger: LogClient<SystemClock>,
    pub store: StoreClient,
    pub browser: Arc<dyn BrowserProxy>,
}

impl HostContext {
    /// Type-erase for injection into the sandbox.
    pub fn into_handle(self) -> HostHandle {
        Arc::new(self)
    }

    /// Recover the concrete context inside an engine.
    pub fn from_handle(handle: &HostHandle) -> Option<&HostContext> {
        handle.downcast_ref::<HostContext>()
    }
}
