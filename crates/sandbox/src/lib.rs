// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gantry-sandbox: dependency closure building and isolated per-test
//! module evaluation.
//!
//! The builder walks `require(...)` references from a test entry and
//! materializes the flat, closed dependency dictionary. The sandbox
//! evaluates that dictionary with a fresh module cache per test, a
//! synthetic resolver (dictionary first, host-native second), shared
//! exports handles for circular imports, and a single injected host
//! object. Module body evaluation itself sits behind [`ScriptEngine`].

mod builder;
mod engine;
mod error;
mod resolve;
mod sandbox;
mod scan;

#[cfg(any(test, feature = "test-support"))]
mod scripted;

pub use builder::{DependencyBuilder, FsReader, MapReader, SourceReader};
pub use engine::{EvaluatedModule, ModuleCtx, ModuleScope, NoOpEngine, ScriptEngine};
pub use error::SandboxError;
pub use resolve::{Resolution, ResolverConfig};
pub use sandbox::{Exports, HostHandle, NativeResolver, NoNativeModules, Sandbox};
pub use scan::{scan_requires, ScanError};

#[cfg(any(test, feature = "test-support"))]
pub use scripted::{ModuleScript, RunScript, ScriptOp, ScriptedEngine};
