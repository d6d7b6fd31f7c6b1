// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-side store access.

use crate::server::StoreServer;
use gantry_core::{
    FileClass, FileHint, FileMeta, FsError, LockToken, Message, MessageKind, ProcessId, RequestId,
    StoreHandle,
};
use gantry_transport::{Bus, TransportError};
use std::path::PathBuf;
use thiserror::Error;

/// Store access failures as seen by callers.
#[derive(Debug, Error)]
pub enum StoreClientError {
    /// The server answered with a typed fault.
    #[error(transparent)]
    Fault(#[from] FsError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The reply channel closed before the server answered.
    #[error("store did not answer")]
    NoAnswer,
}

#[derive(Clone)]
enum ClientInner {
    /// Request/response over the bus (worker processes).
    Remote { bus: Bus },
    /// Direct calls into the in-process server (root, local mode).
    Local {
        server: StoreServer,
        owner: ProcessId,
    },
}

/// Handle to the root store, remote or local.
#[derive(Clone)]
pub struct StoreClient {
    inner: ClientInner,
}

impl StoreClient {
    /// Client for a worker process: every operation is a correlated
    /// request/response pair over the bus.
    pub fn remote(bus: Bus) -> Self {
        Self {
            inner: ClientInner::Remote { bus },
        }
    }

    /// Client for in-process access (the root, or local worker mode).
    pub fn local(server: StoreServer, owner: ProcessId) -> Self {
        Self {
            inner: ClientInner::Local { server, owner },
        }
    }

    pub async fn acquire(
        &self,
        class: FileClass,
        hint: FileHint,
    ) -> Result<StoreHandle, StoreClientError> {
        match &self.inner {
            ClientInner::Local { server, owner } => {
                Ok(server.acquire(owner.clone(), class, hint).await?)
            }
            ClientInner::Remote { bus } => {
                let reply = self
                    .request(
                        bus,
                        MessageKind::FsAcquired,
                        |request_id| Message::FsAcquire {
                            request_id,
                            class,
                            hint: hint.clone(),
                        },
                    )
                    .await?;
                match reply {
                    Message::FsAcquired {
                        handle: Some(handle),
                        ..
                    } => Ok(handle),
                    Message::FsAcquired {
                        error: Some(error), ..
                    } => Err(error.into()),
                    _ => Err(StoreClientError::NoAnswer),
                }
            }
        }
    }

    pub async fn release(&self, token: LockToken) -> Result<(), StoreClientError> {
        match &self.inner {
            ClientInner::Local { server, .. } => Ok(server.release(&token)?),
            ClientInner::Remote { bus } => {
                let reply = self
                    .request(bus, MessageKind::FsReleased, |request_id| {
                        Message::FsRelease {
                            request_id,
                            token: token.clone(),
                        }
                    })
                    .await?;
                match reply {
                    Message::FsReleased {
                        error: Some(error), ..
                    } => Err(error.into()),
                    _ => Ok(()),
                }
            }
        }
    }

    /// Remove the file behind the token and free the reservation.
    pub async fn delete(&self, token: LockToken) -> Result<(), StoreClientError> {
        match &self.inner {
            ClientInner::Local { server, .. } => Ok(server.delete(&token).await?),
            ClientInner::Remote { bus } => {
                let reply = self
                    .request(bus, MessageKind::FsReleased, |request_id| {
                        Message::FsDelete {
                            request_id,
                            token: token.clone(),
                        }
                    })
                    .await?;
                match reply {
                    Message::FsReleased {
                        error: Some(error), ..
                    } => Err(error.into()),
                    _ => Ok(()),
                }
            }
        }
    }

    pub async fn list(&self) -> Result<Vec<PathBuf>, StoreClientError> {
        match &self.inner {
            ClientInner::Local { server, .. } => Ok(server.list()),
            ClientInner::Remote { bus } => {
                let reply = self
                    .request(bus, MessageKind::FsListed, |request_id| Message::FsList {
                        request_id,
                    })
                    .await?;
                match reply {
                    Message::FsListed { paths, .. } => Ok(paths),
                    _ => Err(StoreClientError::NoAnswer),
                }
            }
        }
    }

    pub async fn stat(&self, token: LockToken) -> Result<FileMeta, StoreClientError> {
        match &self.inner {
            ClientInner::Local { server, .. } => Ok(server.stat(&token).await?),
            ClientInner::Remote { bus } => {
                let reply = self
                    .request(bus, MessageKind::FsStatted, |request_id| Message::FsStat {
                        request_id,
                        token: token.clone(),
                    })
                    .await?;
                match reply {
                    Message::FsStatted {
                        meta: Some(meta), ..
                    } => Ok(meta),
                    Message::FsStatted {
                        error: Some(error), ..
                    } => Err(error.into()),
                    _ => Err(StoreClientError::NoAnswer),
                }
            }
        }
    }

    /// Send a correlated request to the root and await its response.
    async fn request<F>(
        &self,
        bus: &Bus,
        reply_kind: MessageKind,
        build: F,
    ) -> Result<Message, StoreClientError>
    where
        F: FnOnce(RequestId) -> Message,
    {
        let request_id = RequestId::new(uuid::Uuid::new_v4().to_string());
        let completion = {
            let request_id = request_id.clone();
            bus.wait_for_match(reply_kind, move |m| m.request_id() == Some(&request_id))
        };
        bus.send(&ProcessId::root(), build(request_id)).await?;
        let (message, _) = completion.await.map_err(|_| StoreClientError::NoAnswer)?;
        Ok(message)
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
