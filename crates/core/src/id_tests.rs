// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::{ProcessId, WorkerId};

#[test]
fn short_truncates_long_ids() {
    let id = WorkerId::new("abcdef-123456");
    assert_eq!(id.short(6), "abcdef");
    assert_eq!(id.short(100), "abcdef-123456");
}

#[test]
fn ids_compare_against_str() {
    let id = ProcessId::new("root");
    assert_eq!(id, "root");
    assert!(id.is_root());
    assert!(!ProcessId::new("w-1").is_root());
}

#[test]
fn worker_id_maps_to_process_id() {
    let worker = WorkerId::new("w-1");
    assert_eq!(worker.process_id(), ProcessId::new("w-1"));
}

#[test]
fn uuid_gen_produces_unique_ids() {
    let gen = UuidIdGen;
    let a = gen.next();
    let b = gen.next();
    assert_ne!(a, b);
}

#[test]
fn sequential_gen_counts_up() {
    let gen = SequentialIdGen::new("t");
    assert_eq!(gen.next(), "t-1");
    assert_eq!(gen.next(), "t-2");

    // Clones share the counter
    let clone = gen.clone();
    assert_eq!(clone.next(), "t-3");
}

#[test]
fn ids_round_trip_through_serde() {
    let id = WorkerId::new("w-7");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"w-7\"");
    let back: WorkerId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}
