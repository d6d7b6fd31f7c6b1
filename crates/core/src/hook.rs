// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named hook registry: the pluggable-module substrate.
//!
//! A [`Hook`] is an ordered collection of async callbacks. Calling a hook
//! runs each callback in registration order, feeding the previous
//! callback's returned payload to the next. Components register their
//! extension points at construction; calling an unregistered name passes
//! the payload through untouched.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Payload flowing through a hook chain.
pub type HookPayload = serde_json::Value;

type BoxedHookFuture = Pin<Box<dyn Future<Output = Result<HookPayload, HookError>> + Send>>;
type HookFn = Arc<dyn Fn(HookPayload) -> BoxedHookFuture + Send + Sync>;

/// Failure raised by a hook callback; aborts the rest of the chain.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("hook callback failed: {0}")]
    Callback(String),
}

/// An ordered chain of async payload transformers.
#[derive(Clone, Default)]
pub struct Hook {
    callbacks: Arc<Mutex<Vec<HookFn>>>,
}

impl Hook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback to the chain.
    pub fn tap<F, Fut>(&self, f: F)
    where
        F: Fn(HookPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HookPayload, HookError>> + Send + 'static,
    {
        self.callbacks.lock().push(Arc::new(move |p| Box::pin(f(p))));
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.lock().is_empty()
    }

    /// Run the chain over `payload`. Callbacks run strictly in
    /// registration order; each receives the previous one's output.
    pub async fn call(&self, mut payload: HookPayload) -> Result<HookPayload, HookError> {
        let callbacks: Vec<HookFn> = self.callbacks.lock().clone();
        for callback in callbacks {
            payload = callback(payload).await?;
        }
        Ok(payload)
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook").field("len", &self.len()).finish()
    }
}

/// Registry of named hooks shared across components.
#[derive(Debug, Clone, Default)]
pub struct HookRegistry {
    hooks: Arc<Mutex<HashMap<String, Hook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The hook registered under `name`, created on first access so
    /// callers can tap extension points before the owning component runs.
    pub fn get_hook(&self, name: &str) -> Hook {
        self.hooks
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Run the named hook chain. An unknown name is a no-op: the payload
    /// comes back unchanged.
    pub async fn call_hook(
        &self,
        name: &str,
        payload: HookPayload,
    ) -> Result<HookPayload, HookError> {
        let hook = self.hooks.lock().get(name).cloned();
        match hook {
            Some(hook) => hook.call(payload).await,
            None => Ok(payload),
        }
    }
}

#[cfg(test)]
#[path = "hook_tests.rs"]
mod tests;
