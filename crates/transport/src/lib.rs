// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gantry-transport: process-addressed message bus and worker launcher.
//!
//! The root process and each worker own one [`Bus`]. Peers are registered
//! on the root bus as workers are spawned; messages for a peer that has not
//! finished booting are buffered and flushed on its hello. Wire format is a
//! 4-byte big-endian length prefix plus a JSON [`Envelope`] over a per-run
//! Unix domain socket.

mod bus;
mod child;
mod envelope;
mod launcher;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use bus::{Bus, TransportError};
pub use child::connect_worker;
pub use envelope::{
    read_envelope, read_frame, write_envelope, write_frame, Envelope, ProtocolError,
    MAX_MESSAGE_SIZE,
};
pub use launcher::{
    allocate_debug_port, is_child_process, worker_args, LaunchError, ProcessLauncher,
    WorkerArgs, WorkerControl, WorkerExit, WorkerHandle, WorkerLauncher, WorkerSpawnOptions,
    DEBUG_PORT_FLAG, SOCKET_FLAG, WORKER_FLAG,
};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeLauncher, FakeWorkerScript};
