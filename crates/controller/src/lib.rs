// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gantry-controller: the test run scheduler.
//!
//! Owns the FIFO test queue, the worker pool, retry and timeout policy,
//! bail, and the final aggregation. Everything is driven from one select
//! loop over bus messages, worker exits, and fired timers; the controller
//! never throws out of that loop, and unexpected errors become terminal
//! failures for the affected test.

mod controller;
pub mod hooks;
mod pool;
mod scheduler;

pub use controller::{ControllerError, RunController};
pub use pool::WorkerPool;
pub use scheduler::{Scheduler, TimerKind};
