// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Root-side store server.
//!
//! Owns the path-reservation table exclusively. Acquisitions take a
//! per-class semaphore permit (FIFO within a class, independent across
//! classes) that is held until release, delete, or the owner's exit. An
//! exclusive lock file under the store root keeps two runs from sharing
//! an output directory.

use crate::naming::{default_filename, unique_path, FILENAME_HOOK};
use fs2::FileExt;
use gantry_core::{
    Clock, FileClass, FileHint, FileMeta, FsError, HookRegistry, LockToken, Message, MessageKind,
    ProcessId, StoreCaps, StoreHandle, SystemClock,
};
use gantry_transport::Bus;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Store startup configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub root: PathBuf,
    pub caps: StoreCaps,
}

/// Startup failures (configuration/launch class).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store root {0} is locked by another run")]
    RootLocked(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

struct Reservation {
    path: PathBuf,
    class: FileClass,
    owner: ProcessId,
    /// Held for the reservation's lifetime; dropping it admits the next
    /// waiter of the same class.
    _permit: tokio::sync::OwnedSemaphorePermit,
}

struct ServerState {
    reservations: HashMap<LockToken, Reservation>,
    closed: bool,
}

struct ServerInner {
    root: PathBuf,
    hooks: HookRegistry,
    clock: SystemClock,
    semaphores: HashMap<FileClass, Arc<Semaphore>>,
    state: Mutex<ServerState>,
    // NOTE(lifetime): held to maintain the exclusive root lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
}

/// The root-owned file allocator.
#[derive(Clone)]
pub struct StoreServer {
    inner: Arc<ServerInner>,
}

impl StoreServer {
    /// Create the store root, take its exclusive lock, and start serving.
    pub fn open(config: StoreConfig, hooks: HookRegistry) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&config.root)?;
        let lock_path = config.root.join(".gantry-store.lock");
        let lock_file = File::create(&lock_path)?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::RootLocked(config.root.clone()))?;

        let semaphores = FileClass::ALL
            .into_iter()
            .map(|class| {
                let cap = config.caps.for_class(class).max(1);
                (class, Arc::new(Semaphore::new(cap)))
            })
            .collect();

        Ok(Self {
            inner: Arc::new(ServerInner {
                root: config.root,
                hooks,
                clock: SystemClock,
                semaphores,
                state: Mutex::new(ServerState {
                    reservations: HashMap::new(),
                    closed: false,
                }),
                lock_file,
            }),
        })
    }

    pub fn root(&self) -> &PathBuf {
        &self.inner.root
    }

    /// Reserve a unique path for `owner`. Blocks while the class is at its
    /// concurrency cap.
    pub async fn acquire(
        &self,
        owner: ProcessId,
        class: FileClass,
        hint: FileHint,
    ) -> Result<StoreHandle, FsError> {
        if self.inner.state.lock().closed {
            return Err(FsError::closed());
        }

        let semaphore = match self.inner.semaphores.get(&class) {
            Some(semaphore) => Arc::clone(semaphore),
            None => return Err(FsError::closed()),
        };
        let permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| FsError::closed())?;

        // The server may have closed while this acquisition queued.
        if self.inner.state.lock().closed {
            return Err(FsError::closed());
        }

        let timestamp = self.inner.clock.epoch_ms();
        let candidate = default_filename(owner.as_str(), timestamp, class, &hint);
        let payload = serde_json::json!({
            "owner": owner.as_str(),
            "timestamp": timestamp,
            "class": class,
            "hint": hint,
            "filename": candidate,
        });
        let payload = self
            .inner
            .hooks
            .call_hook(FILENAME_HOOK, payload)
            .await
            .map_err(|e| FsError::io(e.to_string()))?;
        let filename = payload["filename"]
            .as_str()
            .unwrap_or(&candidate)
            .to_string();

        let token = LockToken::new(uuid::Uuid::new_v4().to_string());
        let (full_path, name, ext) = {
            let mut state = self.inner.state.lock();
            let reserved: HashSet<PathBuf> = state
                .reservations
                .values()
                .map(|r| r.path.clone())
                .collect();
            let full_path = unique_path(&self.inner.root, &filename, &reserved);
            let name = full_path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let ext = full_path
                .extension()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            state.reservations.insert(
                token.clone(),
                Reservation {
                    path: full_path.clone(),
                    class,
                    owner: owner.clone(),
                    _permit: permit,
                },
            );
            (full_path, name, ext)
        };

        tracing::debug!(
            owner = %owner,
            class = %class,
            path = %full_path.display(),
            "path reserved"
        );

        Ok(StoreHandle {
            full_path,
            ext,
            name,
            class,
            lock_token: token,
        })
    }

    /// Free a reservation. Unknown tokens are non-fatal.
    pub fn release(&self, token: &LockToken) -> Result<(), FsError> {
        let removed = self.inner.state.lock().reservations.remove(token);
        match removed {
            Some(reservation) => {
                tracing::debug!(path = %reservation.path.display(), "path released");
                Ok(())
            }
            None => {
                let err = FsError::unknown_lock(token);
                tracing::warn!(%token, "release of unknown lock token");
                Err(err)
            }
        }
    }

    /// Remove the file (if present) and free the reservation.
    pub async fn delete(&self, token: &LockToken) -> Result<(), FsError> {
        let reservation = self.inner.state.lock().reservations.remove(token);
        match reservation {
            None => {
                tracing::warn!(%token, "delete of unknown lock token");
                Err(FsError::unknown_lock(token))
            }
            Some(reservation) => {
                match tokio::fs::remove_file(&reservation.path).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(FsError::io(e.to_string())),
                }
            }
        }
    }

    /// Paths of every live reservation.
    pub fn list(&self) -> Vec<PathBuf> {
        self.inner
            .state
            .lock()
            .reservations
            .values()
            .map(|r| r.path.clone())
            .collect()
    }

    /// Point-in-time metadata for a reserved path.
    pub async fn stat(&self, token: &LockToken) -> Result<FileMeta, FsError> {
        let path = {
            let state = self.inner.state.lock();
            state
                .reservations
                .get(token)
                .map(|r| r.path.clone())
                .ok_or_else(|| FsError::unknown_lock(token))?
        };
        let meta = tokio::fs::metadata(&path).await.ok();
        Ok(FileMeta {
            exists: meta.is_some(),
            size: meta.map(|m| m.len()).unwrap_or(0),
            full_path: path,
        })
    }

    /// Release every reservation held by `owner` (worker exit).
    pub fn release_owner(&self, owner: &ProcessId) -> usize {
        let mut state = self.inner.state.lock();
        let before = state.reservations.len();
        state.reservations.retain(|_, r| r.owner != *owner);
        let released = before - state.reservations.len();
        if released > 0 {
            tracing::debug!(owner = %owner, released, "released reservations on worker exit");
        }
        released
    }

    /// Reservations currently held for a class (test visibility).
    pub fn held_for_class(&self, class: FileClass) -> usize {
        self.inner
            .state
            .lock()
            .reservations
            .values()
            .filter(|r| r.class == class)
            .count()
    }

    /// Tear the server down. Queued and future acquisitions fail with
    /// `StoreClosed`; existing reservations are dropped.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        state.closed = true;
        state.reservations.clear();
        for semaphore in self.inner.semaphores.values() {
            semaphore.close();
        }
    }

    /// Wire the server to the root bus: every `fs:*` request from workers
    /// is answered with its correlated response.
    pub fn serve(&self, bus: &Bus) {
        for kind in [
            MessageKind::FsAcquire,
            MessageKind::FsRelease,
            MessageKind::FsDelete,
            MessageKind::FsList,
            MessageKind::FsStat,
        ] {
            let server = self.clone();
            let bus_handle = bus.clone();
            bus.on(kind, move |message, source| {
                let server = server.clone();
                let bus = bus_handle.clone();
                // Acquisitions can block on the class semaphore; never
                // stall the dispatch task.
                tokio::spawn(async move {
                    if let Some(reply) = server.answer(message, &source).await {
                        if let Err(e) = bus.send(&source, reply).await {
                            tracing::warn!(peer = %source, error = %e, "store reply failed");
                        }
                    }
                });
            });
        }
    }

    async fn answer(&self, message: Message, source: &ProcessId) -> Option<Message> {
        match message {
            Message::FsAcquire {
                request_id,
                class,
                hint,
            } => {
                let reply = match self.acquire(source.clone(), class, hint).await {
                    Ok(handle) => Message::FsAcquired {
                        request_id,
                        handle: Some(handle),
                        error: None,
                    },
                    Err(error) => Message::FsAcquired {
                        request_id,
                        handle: None,
                        error: Some(error),
                    },
                };
                Some(reply)
            }
            Message::FsRelease { request_id, token } => Some(Message::FsReleased {
                request_id,
                error: self.release(&token).err(),
            }),
            Message::FsDelete { request_id, token } => Some(Message::FsReleased {
                request_id,
                error: self.delete(&token).await.err(),
            }),
            Message::FsList { request_id } => Some(Message::FsListed {
                request_id,
                paths: self.list(),
            }),
            Message::FsStat { request_id, token } => {
                let reply = match self.stat(&token).await {
                    Ok(meta) => Message::FsStatted {
                        request_id,
                        meta: Some(meta),
                        error: None,
                    },
                    Err(error) => Message::FsStatted {
                        request_id,
                        meta: None,
                        error: Some(error),
                    },
                };
                Some(reply)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
