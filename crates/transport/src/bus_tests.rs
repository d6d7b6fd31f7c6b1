// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gantry_core::{CancelReason, WorkerId};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

fn hello(worker: &str) -> Message {
    Message::WorkerHello {
        worker_id: WorkerId::new(worker),
    }
}

/// Push a message into the bus as if peer `source` had sent it.
async fn inject(bus: &Bus, source: &str, message: Message) {
    bus.inbound_sender()
        .send(Envelope::new(
            ProcessId::new(source),
            Some(bus.process_id().clone()),
            message,
        ))
        .await
        .unwrap();
}

/// Wait until every previously injected message has been dispatched, by
/// riding the FIFO guarantee with a sentinel.
async fn drain(bus: &Bus) {
    let sentinel = bus.wait_for(MessageKind::Shutdown);
    inject(bus, "drain-sentinel", Message::Shutdown).await;
    sentinel.await.unwrap();
}

#[tokio::test]
async fn send_to_unknown_peer_fails() {
    let bus = Bus::root();
    let err = bus
        .send(&ProcessId::new("never-registered"), Message::Shutdown)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::UnknownPeer(_)));
}

#[tokio::test]
async fn messages_buffer_until_peer_connects() {
    let bus = Bus::root();
    let peer = ProcessId::new("w-1");
    bus.register_peer(peer.clone());

    bus.send(&peer, hello("first")).await.unwrap();
    bus.send(&peer, hello("second")).await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    bus.connect_peer(peer.clone(), tx).await;

    let a = rx.recv().await.unwrap();
    let b = rx.recv().await.unwrap();
    assert_eq!(a.message, hello("first"), "buffer flushes in send order");
    assert_eq!(b.message, hello("second"));

    // Once connected, sends go straight through.
    bus.send(&peer, hello("third")).await.unwrap();
    assert_eq!(rx.recv().await.unwrap().message, hello("third"));
}

#[tokio::test]
async fn unregister_drops_buffered_messages() {
    let bus = Bus::root();
    let peer = ProcessId::new("w-1");
    bus.register_peer(peer.clone());
    bus.send(&peer, Message::Shutdown).await.unwrap();

    bus.unregister_peer(&peer);

    // Still known, but gone.
    let err = bus.send(&peer, Message::Shutdown).await.unwrap_err();
    assert!(matches!(err, TransportError::PeerGone(_)));
}

#[tokio::test]
async fn reregistration_behaves_like_a_fresh_peer() {
    let bus = Bus::root();
    let peer = ProcessId::new("w-1");

    bus.register_peer(peer.clone());
    bus.send(&peer, hello("lost")).await.unwrap();
    bus.unregister_peer(&peer);

    bus.register_peer(peer.clone());
    bus.send(&peer, hello("kept")).await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    bus.connect_peer(peer, tx).await;

    // Only the post-reregistration message arrives.
    assert_eq!(rx.recv().await.unwrap().message, hello("kept"));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn on_sees_every_match_once_sees_one() {
    let bus = Bus::root();
    let on_count = Arc::new(AtomicUsize::new(0));
    let once_count = Arc::new(AtomicUsize::new(0));

    {
        let on_count = Arc::clone(&on_count);
        bus.on(MessageKind::WorkerHello, move |_, _| {
            on_count.fetch_add(1, AtomicOrdering::SeqCst);
        });
    }
    {
        let once_count = Arc::clone(&once_count);
        bus.once(MessageKind::WorkerHello, move |_, _| {
            once_count.fetch_add(1, AtomicOrdering::SeqCst);
        });
    }

    inject(&bus, "w-1", hello("w-1")).await;
    inject(&bus, "w-1", hello("w-1")).await;
    drain(&bus).await;

    assert_eq!(on_count.load(AtomicOrdering::SeqCst), 2);
    assert_eq!(once_count.load(AtomicOrdering::SeqCst), 1);
}

#[tokio::test]
async fn once_from_filters_by_source() {
    let bus = Bus::root();
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        bus.once_from(ProcessId::new("w-2"), MessageKind::WorkerHello, move |_, source| {
            seen.lock().push(source);
        });
    }

    inject(&bus, "w-1", hello("w-1")).await;
    inject(&bus, "w-2", hello("w-2")).await;
    drain(&bus).await;

    let seen = seen.lock();
    assert_eq!(seen.as_slice(), [ProcessId::new("w-2")]);
}

#[tokio::test]
async fn handlers_observe_fifo_order_per_sender() {
    let bus = Bus::root();
    let order = Arc::new(Mutex::new(Vec::new()));
    {
        let order = Arc::clone(&order);
        bus.on(MessageKind::CancelTest, move |message, _| {
            if let Message::CancelTest { reason } = message {
                order.lock().push(reason);
            }
        });
    }

    for reason in [
        CancelReason::Timeout,
        CancelReason::Bail,
        CancelReason::GlobalTimeout,
    ] {
        inject(&bus, "w-1", Message::CancelTest { reason }).await;
    }
    drain(&bus).await;

    assert_eq!(
        order.lock().as_slice(),
        [
            CancelReason::Timeout,
            CancelReason::Bail,
            CancelReason::GlobalTimeout,
        ]
    );
}

#[tokio::test]
async fn wait_for_match_correlates_by_request_id() {
    let bus = Bus::root();
    let wanted = gantry_core::RequestId::new("r-2");
    let completion = {
        let wanted = wanted.clone();
        bus.wait_for_match(MessageKind::FsListed, move |m| {
            m.request_id() == Some(&wanted)
        })
    };

    inject(
        &bus,
        "w-1",
        Message::FsListed {
            request_id: gantry_core::RequestId::new("r-1"),
            paths: vec![],
        },
    )
    .await;
    inject(
        &bus,
        "w-1",
        Message::FsListed {
            request_id: wanted.clone(),
            paths: vec!["/tmp/x".into()],
        },
    )
    .await;

    let (message, _) = completion.await.unwrap();
    assert_eq!(message.request_id(), Some(&wanted));
}

#[tokio::test]
async fn root_broadcast_fans_to_all_peers() {
    let bus = Bus::root();
    let (tx1, mut rx1) = tokio::sync::mpsc::channel(4);
    let (tx2, mut rx2) = tokio::sync::mpsc::channel(4);
    bus.register_peer(ProcessId::new("w-1"));
    bus.register_peer(ProcessId::new("w-2"));
    bus.connect_peer(ProcessId::new("w-1"), tx1).await;
    bus.connect_peer(ProcessId::new("w-2"), tx2).await;

    bus.broadcast(Message::Shutdown).await.unwrap();

    assert_eq!(rx1.recv().await.unwrap().message, Message::Shutdown);
    assert_eq!(rx2.recv().await.unwrap().message, Message::Shutdown);
}

#[tokio::test]
async fn child_broadcast_routes_up_to_root() {
    let (to_root_tx, mut to_root_rx) = tokio::sync::mpsc::channel(4);
    let bus = Bus::child(ProcessId::new("w-1"), to_root_tx);
    assert!(bus.is_child());

    bus.broadcast(hello("w-1")).await.unwrap();
    let upward = to_root_rx.recv().await.unwrap();
    assert_eq!(upward.message, hello("w-1"));

    bus.broadcast_universally(Message::Shutdown).await.unwrap();
    let wrapped = to_root_rx.recv().await.unwrap();
    assert!(
        matches!(wrapped.message, Message::Broadcast { .. }),
        "universal broadcast from a child asks the root to re-fan"
    );
}

#[tokio::test]
async fn root_refans_child_broadcast_requests() {
    let bus = Bus::root();
    let (tx, mut rx) = tokio::sync::mpsc::channel(4);
    bus.register_peer(ProcessId::new("w-2"));
    bus.connect_peer(ProcessId::new("w-2"), tx).await;

    let local = bus.wait_for(MessageKind::Shutdown);
    inject(
        &bus,
        "w-1",
        Message::Broadcast {
            message: Box::new(Message::Shutdown),
        },
    )
    .await;

    // Local subscribers see the unwrapped message...
    let (message, source) = local.await.unwrap();
    assert_eq!(message, Message::Shutdown);
    assert_eq!(source, ProcessId::new("w-1"));
    // ...and so does the registered peer.
    assert_eq!(rx.recv().await.unwrap().message, Message::Shutdown);
}

#[tokio::test]
async fn broadcast_local_never_reaches_peers() {
    let bus = Bus::root();
    let (tx, mut rx) = tokio::sync::mpsc::channel(4);
    bus.register_peer(ProcessId::new("w-1"));
    bus.connect_peer(ProcessId::new("w-1"), tx).await;

    let local = bus.wait_for(MessageKind::Shutdown);
    bus.broadcast_local(Message::Shutdown).await.unwrap();
    local.await.unwrap();

    assert!(rx.try_recv().is_err(), "local broadcast crossed the boundary");
}
