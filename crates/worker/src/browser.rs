// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser-proxy control plane.
//!
//! Tests address their own automation sessions by an opaque applicant id;
//! the actual driver is an external collaborator behind this trait. The
//! worker only needs the control plane: start/stop per applicant, a
//! best-effort abort for cooperative cancellation, and a hard kill on
//! shutdown.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserProxyError {
    #[error("browser proxy: {0}")]
    Proxy(String),
}

/// Opaque browser-automation capability exposed to tests.
#[async_trait]
pub trait BrowserProxy: Send + Sync + 'static {
    /// Open a session for an applicant.
    async fn start(&self, applicant: &str) -> Result<(), BrowserProxyError>;

    /// Close an applicant's session.
    async fn stop(&self, applicant: &str) -> Result<(), BrowserProxyError>;

    /// Best-effort abort of everything in flight. Called on cancellation.
    async fn abort_all(&self);

    /// Hard teardown. Called on worker shutdown.
    async fn kill(&self);
}

/// Driverless proxy: every operation succeeds and does nothing.
#[derive(Debug, Clone, Default)]
pub struct NoOpBrowserProxy;

#[async_trait]
impl BrowserProxy for NoOpBrowserProxy {
    async fn start(&self, _applicant: &str) -> Result<(), BrowserProxyError> {
        Ok(())
    }

    async fn stop(&self, _applicant: &str) -> Result<(), BrowserProxyError> {
        Ok(())
    }

    async fn abort_all(&self) {}

    async fn kill(&self) {}
}
