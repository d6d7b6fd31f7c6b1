// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker process launcher.
//!
//! The production launcher re-invokes the current executable with a
//! reserved argv flag and wires the worker's Unix-socket connection into
//! the root bus. Worker exits are reported on a channel so the controller
//! can tell a crash from a clean shutdown.

use crate::bus::Bus;
use crate::envelope::{read_envelope, write_envelope, ProtocolError};
use async_trait::async_trait;
use gantry_core::WorkerId;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::mpsc;

/// Reserved argv flag identifying a spawned worker process.
pub const WORKER_FLAG: &str = "--gantry-worker";
/// Argv flag carrying the root socket path to a worker.
pub const SOCKET_FLAG: &str = "--gantry-socket";
/// Argv flag carrying an allocated debug port to a worker.
pub const DEBUG_PORT_FLAG: &str = "--gantry-debug-port";

/// How long a freshly accepted connection gets to identify itself.
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// Launch failures (configuration/launch class, exit code 2).
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to spawn worker: {0}")]
    Spawn(String),
    #[error("no free debug port in {start}..={end}")]
    NoFreeDebugPort { start: u16, end: u16 },
}

/// Options for spawning one worker.
#[derive(Debug, Clone)]
pub struct WorkerSpawnOptions {
    pub worker_id: WorkerId,
    pub debug: bool,
    pub debug_port_range: [u16; 2],
}

impl WorkerSpawnOptions {
    pub fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            debug: false,
            debug_port_range: [9229, 9240],
        }
    }
}

/// Exit notification for a spawned worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerExit {
    pub worker_id: WorkerId,
    pub code: Option<i32>,
}

/// Kill switch behind a [`WorkerHandle`].
#[async_trait]
pub trait WorkerControl: Send + Sync {
    async fn kill(&self);
}

/// Handle to a spawned worker: its id, its debug port when allocated, and
/// a kill switch. Exit is reported out-of-band on the launcher's channel.
#[derive(Clone)]
pub struct WorkerHandle {
    pub worker_id: WorkerId,
    pub debug_port: Option<u16>,
    control: Arc<dyn WorkerControl>,
}

impl WorkerHandle {
    pub fn new(
        worker_id: WorkerId,
        debug_port: Option<u16>,
        control: Arc<dyn WorkerControl>,
    ) -> Self {
        Self {
            worker_id,
            debug_port,
            control,
        }
    }

    /// Kill the worker process. Exit still arrives on the exit channel.
    pub async fn kill(&self) {
        self.control.kill().await;
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("worker_id", &self.worker_id)
            .field("debug_port", &self.debug_port)
            .finish()
    }
}

/// Spawns workers and wires them into the bus.
#[async_trait]
pub trait WorkerLauncher: Clone + Send + Sync + 'static {
    async fn spawn(&self, options: WorkerSpawnOptions) -> Result<WorkerHandle, LaunchError>;
}

/// True iff the current process was launched by this facility.
pub fn is_child_process<I>(args: I) -> bool
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    args.into_iter().any(|a| a.as_ref() == WORKER_FLAG)
}

/// Flags parsed from a worker process's argv.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerArgs {
    pub worker_id: WorkerId,
    pub socket_path: PathBuf,
    pub debug_port: Option<u16>,
}

/// Parse the reserved worker flags out of argv. Returns `None` when the
/// process was not launched as a worker or the flags are incomplete.
pub fn worker_args(args: &[String]) -> Option<WorkerArgs> {
    let mut worker_id = None;
    let mut socket_path = None;
    let mut debug_port = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            WORKER_FLAG => worker_id = iter.next().map(WorkerId::new),
            SOCKET_FLAG => socket_path = iter.next().map(PathBuf::from),
            DEBUG_PORT_FLAG => debug_port = iter.next().and_then(|p| p.parse().ok()),
            _ => {}
        }
    }

    Some(WorkerArgs {
        worker_id: worker_id?,
        socket_path: socket_path?,
        debug_port,
    })
}

/// Probe for the first free TCP port in the inclusive range.
pub fn allocate_debug_port(range: [u16; 2]) -> Option<u16> {
    let [start, end] = range;
    (start..=end).find(|port| std::net::TcpListener::bind(("127.0.0.1", *port)).is_ok())
}

/// Production launcher: spawns `current_exe()` with the reserved flags and
/// owns the Unix socket workers connect back to.
#[derive(Clone)]
pub struct ProcessLauncher {
    bus: Bus,
    socket_path: PathBuf,
    exit_tx: mpsc::Sender<WorkerExit>,
}

impl ProcessLauncher {
    /// Bind the per-run socket and start accepting worker connections.
    pub fn bind(
        bus: Bus,
        socket_path: PathBuf,
        exit_tx: mpsc::Sender<WorkerExit>,
    ) -> Result<Self, LaunchError> {
        let listener = UnixListener::bind(&socket_path)?;
        let accept_bus = bus.clone();
        tokio::spawn(async move {
            accept_loop(accept_bus, listener).await;
        });
        Ok(Self {
            bus,
            socket_path,
            exit_tx,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn spawn(&self, options: WorkerSpawnOptions) -> Result<WorkerHandle, LaunchError> {
        let debug_port = if options.debug {
            let [start, end] = options.debug_port_range;
            let port = allocate_debug_port(options.debug_port_range)
                .ok_or(LaunchError::NoFreeDebugPort { start, end })?;
            Some(port)
        } else {
            None
        };

        let exe = std::env::current_exe()?;
        let mut command = tokio::process::Command::new(exe);
        command
            .arg(WORKER_FLAG)
            .arg(options.worker_id.as_str())
            .arg(SOCKET_FLAG)
            .arg(&self.socket_path);
        if let Some(port) = debug_port {
            command.arg(DEBUG_PORT_FLAG).arg(port.to_string());
        }
        command.kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| LaunchError::Spawn(e.to_string()))?;

        tracing::info!(
            worker_id = %options.worker_id,
            pid = child.id(),
            ?debug_port,
            "spawned worker"
        );

        // Register before the hello so sends buffer instead of failing.
        self.bus.register_peer(options.worker_id.process_id());

        let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);
        let exit_tx = self.exit_tx.clone();
        let bus = self.bus.clone();
        let worker_id = options.worker_id.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                res = child.wait() => res.ok(),
                _ = kill_rx.recv() => None,
            };
            let status = match status {
                Some(status) => Some(status),
                None => {
                    let _ = child.kill().await;
                    child.wait().await.ok()
                }
            };
            bus.unregister_peer(&worker_id.process_id());
            let exit = WorkerExit {
                worker_id: worker_id.clone(),
                code: status.and_then(|s| s.code()),
            };
            tracing::info!(worker_id = %exit.worker_id, code = ?exit.code, "worker exited");
            let _ = exit_tx.send(exit).await;
        });

        Ok(WorkerHandle::new(
            options.worker_id,
            debug_port,
            Arc::new(ProcessControl { kill_tx }),
        ))
    }
}

struct ProcessControl {
    kill_tx: mpsc::Sender<()>,
}

#[async_trait]
impl WorkerControl for ProcessControl {
    async fn kill(&self) {
        let _ = self.kill_tx.send(()).await;
    }
}

async fn accept_loop(bus: Bus, listener: UnixListener) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let bus = bus.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(bus, stream).await {
                        tracing::warn!(error = %e, "worker connection ended with error");
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "socket accept failed");
                break;
            }
        }
    }
}

/// Drive one worker connection: identify it from its first envelope, wire
/// the writer, then pump inbound envelopes until EOF.
async fn serve_connection(
    bus: Bus,
    stream: tokio::net::UnixStream,
) -> Result<(), ProtocolError> {
    let (mut read_half, mut write_half) = stream.into_split();

    let first = tokio::time::timeout(HELLO_TIMEOUT, read_envelope(&mut read_half))
        .await
        .map_err(|_| {
            ProtocolError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "worker did not identify itself in time",
            ))
        })??;
    let peer_id = first.source.clone();

    let (outbound_tx, mut outbound_rx) = mpsc::channel(256);
    bus.connect_peer(peer_id.clone(), outbound_tx).await;

    let writer_peer = peer_id.clone();
    tokio::spawn(async move {
        while let Some(envelope) = outbound_rx.recv().await {
            if let Err(e) = write_envelope(&mut write_half, &envelope).await {
                tracing::warn!(peer = %writer_peer, error = %e, "worker write failed");
                break;
            }
        }
    });

    let inbound = bus.inbound_sender();
    if inbound.send(first).await.is_err() {
        return Ok(());
    }

    loop {
        match read_envelope(&mut read_half).await {
            Ok(envelope) => {
                if inbound.send(envelope).await.is_err() {
                    break;
                }
            }
            Err(ProtocolError::ConnectionClosed) => break,
            Err(e) => {
                tracing::warn!(peer = %peer_id, error = %e, "worker read failed");
                break;
            }
        }
    }

    bus.unregister_peer(&peer_id);
    Ok(())
}

#[cfg(test)]
#[path = "launcher_tests.rs"]
mod tests;
