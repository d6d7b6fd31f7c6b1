// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-test isolated module evaluation.

use crate::engine::{EvaluatedModule, ModuleCtx, ModuleScope, ScriptEngine};
use crate::error::SandboxError;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use gantry_core::DependencyDict;

/// The single ambient host object injected into every module scope. The
/// engine downcasts it to the concrete context the embedding provides.
pub type HostHandle = Arc<dyn Any + Send + Sync>;

/// Host-runtime module loader fallback for requests the dictionary does
/// not cover.
pub trait NativeResolver: Send + Sync {
    fn resolve(&self, request: &str) -> Option<Exports>;
}

/// Default native resolver: nothing outside the dictionary resolves.
#[derive(Debug, Clone, Default)]
pub struct NoNativeModules;

impl NativeResolver for NoNativeModules {
    fn resolve(&self, _request: &str) -> Option<Exports> {
        None
    }
}

/// A module's exports: a shared handle, mutated by the engine while the
/// module evaluates. Circular imports observe the handle mid-population.
#[derive(Clone, Default)]
pub struct Exports(Arc<Mutex<serde_json::Map<String, serde_json::Value>>>);

impl Exports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.0.lock().insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.0.lock().get(key).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    /// Point-in-time copy of the exports object.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Object(self.0.lock().clone())
    }

    /// Whether two handles alias the same exports object.
    pub fn same_object(&self, other: &Exports) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Exports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Exports({})", self.snapshot())
    }
}

struct Slot {
    exports: Exports,
    done: bool,
}

/// A fresh evaluation root for one test: dictionary, engine, host object,
/// and a module cache that lives no longer than the test.
pub struct Sandbox {
    entry_path: String,
    dict: DependencyDict,
    engine: Arc<dyn ScriptEngine>,
    native: Arc<dyn NativeResolver>,
    host: HostHandle,
    cache: Mutex<HashMap<String, Slot>>,
}

impl Sandbox {
    pub fn new(
        entry_path: impl Into<String>,
        dict: DependencyDict,
        engine: Arc<dyn ScriptEngine>,
        host: HostHandle,
    ) -> Self {
        Self {
            entry_path: entry_path.into(),
            dict,
            engine,
            native: Arc::new(NoNativeModules),
            host,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_native(mut self, native: Arc<dyn NativeResolver>) -> Self {
        self.native = native;
        self
    }

    pub fn entry_path(&self) -> &str {
        &self.entry_path
    }

    /// Evaluate the entry and its graph. Idempotent within one root: a
    /// second call reuses the cache.
    pub fn evaluate_entry(&self) -> Result<EvaluatedModule, SandboxError> {
        let exports = self.evaluate_module(&self.entry_path.clone())?;
        Ok(EvaluatedModule {
            path: self.entry_path.clone(),
            exports,
        })
    }

    fn evaluate_module(&self, path: &str) -> Result<Exports, SandboxError> {
        // A hit returns the existing handle: done modules their exports,
        // in-flight modules their partially populated object (cycles).
        if let Some(slot) = self.cache.lock().get(path) {
            return Ok(slot.exports.clone());
        }

        let node = self
            .dict
            .get(path)
            .ok_or_else(|| SandboxError::UnknownModule {
                path: path.to_string(),
            })?;

        let exports = Exports::new();
        self.cache.lock().insert(
            path.to_string(),
            Slot {
                exports: exports.clone(),
                done: false,
            },
        );

        let mut scope = SandboxScope {
            sandbox: self,
            path: path.to_string(),
            exports: exports.clone(),
        };
        let ctx = ModuleCtx {
            path,
            content: &node.content,
        };
        match self.engine.evaluate(&ctx, &mut scope) {
            Ok(()) => {
                if let Some(slot) = self.cache.lock().get_mut(path) {
                    slot.done = true;
                }
                Ok(exports)
            }
            Err(e) => {
                // A failed module must not satisfy later requires.
                self.cache.lock().remove(path);
                Err(e)
            }
        }
    }

    /// Drop all module state. The next evaluation starts from a fresh
    /// root; nothing carries over between tests.
    pub fn teardown(&self) {
        self.cache.lock().clear();
    }

    /// Number of modules currently cached in this root.
    pub fn cached_modules(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn host(&self) -> HostHandle {
        Arc::clone(&self.host)
    }

    pub fn engine(&self) -> Arc<dyn ScriptEngine> {
        Arc::clone(&self.engine)
    }
}

struct SandboxScope<'a> {
    sandbox: &'a Sandbox,
    path: String,
    exports: Exports,
}

impl ModuleScope for SandboxScope<'_> {
    fn require(&mut self, request: &str) -> Result<Exports, SandboxError> {
        if let Some(target) = self.sandbox.dict.resolve(&self.path, request) {
            let target = target.to_string();
            return self.sandbox.evaluate_module(&target);
        }
        match self.sandbox.native.resolve(request) {
            Some(exports) => Ok(exports),
            None => Err(SandboxError::RuntimeResolution {
                request: request.to_string(),
                parent: self.path.clone(),
            }),
        }
    }

    fn exports(&self) -> Exports {
        self.exports.clone()
    }

    fn host(&self) -> HostHandle {
        self.sandbox.host()
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn requests(&self) -> Vec<String> {
        self.sandbox
            .dict
            .get(&self.path)
            .map(|node| node.requests.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "sandbox_tests.rs"]
mod tests;
