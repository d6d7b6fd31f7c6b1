// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The script-engine seam.
//!
//! The sandbox owns module-graph mechanics: resolution order, cycle
//! semantics, cache lifecycle, host injection. An engine contributes two
//! things: evaluating one module body against its scope, and driving an
//! evaluated entry to completion. A JS runtime embedding implements this
//! trait; the in-tree [`NoOpEngine`] walks the declared request graph and
//! passes every entry, which exercises the full transport/store/logging
//! path without a language runtime.

use crate::error::SandboxError;
use crate::sandbox::{Exports, HostHandle};
use async_trait::async_trait;
use gantry_core::TestFailure;

/// One module body handed to the engine.
#[derive(Debug, Clone, Copy)]
pub struct ModuleCtx<'a> {
    pub path: &'a str,
    pub content: &'a str,
}

/// What a module body can reach while evaluating: its own exports, the
/// synthetic resolver, and the injected host object.
pub trait ModuleScope {
    /// Resolve a request: dictionary sibling first, host-native second.
    fn require(&mut self, request: &str) -> Result<Exports, SandboxError>;

    /// This module's (mutable, shared) exports handle.
    fn exports(&self) -> Exports;

    /// The single ambient host object.
    fn host(&self) -> HostHandle;

    fn path(&self) -> &str;

    /// Requests recorded for this module in the dependency dictionary.
    fn requests(&self) -> Vec<String>;
}

/// An entry module after evaluation.
#[derive(Debug, Clone)]
pub struct EvaluatedModule {
    pub path: String,
    pub exports: Exports,
}

/// Evaluates module bodies and runs test entries.
#[async_trait]
pub trait ScriptEngine: Send + Sync + 'static {
    /// Evaluate a module body, populating `scope.exports()`.
    fn evaluate(
        &self,
        module: &ModuleCtx<'_>,
        scope: &mut dyn ModuleScope,
    ) -> Result<(), SandboxError>;

    /// Drive the evaluated entry to completion. The worker awaits this;
    /// cancellation drops the future at its next suspension point.
    async fn run_entry(
        &self,
        entry: &EvaluatedModule,
        host: &HostHandle,
    ) -> Result<(), TestFailure>;
}

/// Smoke engine: evaluates the dependency graph by walking each module's
/// declared requests, then passes the entry.
#[derive(Debug, Clone, Default)]
pub struct NoOpEngine;

#[async_trait]
impl ScriptEngine for NoOpEngine {
    fn evaluate(
        &self,
        module: &ModuleCtx<'_>,
        scope: &mut dyn ModuleScope,
    ) -> Result<(), SandboxError> {
        for request in scope.requests() {
            scope.require(&request)?;
        }
        scope
            .exports()
            .set("path", serde_json::Value::String(module.path.to_string()));
        Ok(())
    }

    async fn run_entry(
        &self,
        _entry: &EvaluatedModule,
        _host: &HostHandle,
    ) -> Result<(), TestFailure> {
        Ok(())
    }
}
