// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-addressed message bus.
//!
//! One `Bus` per process. The root bus routes between in-process
//! subscribers and registered worker peers; a child bus has exactly one
//! peer, the root. Subscriptions are matched by [`MessageKind`] and run on
//! the bus's single dispatch task, so delivery is FIFO per (sender,
//! receiver) pair and handlers never observe reordering within a kind.

use crate::envelope::Envelope;
use gantry_core::{Message, MessageKind, ProcessId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Transport failures surfaced to senders.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The id has never been registered on this bus.
    #[error("unknown peer: {0}")]
    UnknownPeer(ProcessId),
    /// The peer was registered but its channel is gone.
    #[error("peer gone: {0}")]
    PeerGone(ProcessId),
    #[error(transparent)]
    Protocol(#[from] crate::envelope::ProtocolError),
}

/// Handler invoked with `(message, source)` on the dispatch task.
type Handler = Arc<dyn Fn(Message, ProcessId) + Send + Sync>;
type Predicate = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

struct Subscription {
    id: u64,
    kind: MessageKind,
    from: Option<ProcessId>,
    predicate: Option<Predicate>,
    once: bool,
    handler: Handler,
}

struct Peer {
    /// `None` until the peer's process can receive; sends are buffered
    /// until [`Bus::connect_peer`] attaches the channel.
    outbound: Option<mpsc::Sender<Envelope>>,
    buffer: Vec<Envelope>,
}

#[derive(Default)]
struct Inner {
    peers: HashMap<ProcessId, Peer>,
    /// Ids that have ever been registered, for UnknownPeer vs PeerGone.
    known: std::collections::HashSet<ProcessId>,
    subscriptions: Vec<Subscription>,
}

/// The per-process message bus.
#[derive(Clone)]
pub struct Bus {
    id: ProcessId,
    is_child: bool,
    inner: Arc<Mutex<Inner>>,
    inbound_tx: mpsc::Sender<Envelope>,
    next_sub_id: Arc<AtomicU64>,
}

impl Bus {
    /// Bus for the root process. Spawns the dispatch task.
    pub fn root() -> Self {
        Self::build(ProcessId::root(), false)
    }

    /// Bus for a worker process. The root peer is registered and ready
    /// from the start; `outbound_to_root` carries everything sent upward.
    pub fn child(id: ProcessId, outbound_to_root: mpsc::Sender<Envelope>) -> Self {
        let bus = Self::build(id, true);
        {
            let mut inner = bus.inner.lock();
            inner.known.insert(ProcessId::root());
            inner.peers.insert(
                ProcessId::root(),
                Peer {
                    outbound: Some(outbound_to_root),
                    buffer: Vec::new(),
                },
            );
        }
        bus
    }

    fn build(id: ProcessId, is_child: bool) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(1024);
        let bus = Self {
            id,
            is_child,
            inner: Arc::new(Mutex::new(Inner::default())),
            inbound_tx,
            next_sub_id: Arc::new(AtomicU64::new(1)),
        };
        bus.spawn_dispatch(inbound_rx);
        bus
    }

    fn spawn_dispatch(&self, mut inbound_rx: mpsc::Receiver<Envelope>) {
        let bus = self.clone();
        tokio::spawn(async move {
            while let Some(envelope) = inbound_rx.recv().await {
                bus.route_inbound(envelope).await;
            }
        });
    }

    /// Id of this process on the bus.
    pub fn process_id(&self) -> &ProcessId {
        &self.id
    }

    pub fn is_child(&self) -> bool {
        self.is_child
    }

    /// Ids of every currently registered peer.
    pub fn peers(&self) -> Vec<ProcessId> {
        self.inner.lock().peers.keys().cloned().collect()
    }

    /// Where connection readers (and in-process fakes) push received
    /// envelopes.
    pub fn inbound_sender(&self) -> mpsc::Sender<Envelope> {
        self.inbound_tx.clone()
    }

    // -- peer lifecycle --

    /// Register a peer id before its process can receive. Messages sent to
    /// it are buffered until [`Bus::connect_peer`]. Re-registering an
    /// existing id keeps its buffered messages.
    pub fn register_peer(&self, id: ProcessId) {
        let mut inner = self.inner.lock();
        inner.known.insert(id.clone());
        inner.peers.entry(id).or_insert_with(|| Peer {
            outbound: None,
            buffer: Vec::new(),
        });
    }

    /// Attach the outbound channel for a registered peer and flush its
    /// buffer. Also used to supersede a prior handle.
    pub async fn connect_peer(&self, id: ProcessId, outbound: mpsc::Sender<Envelope>) {
        let buffered = {
            let mut inner = self.inner.lock();
            inner.known.insert(id.clone());
            let peer = inner.peers.entry(id.clone()).or_insert_with(|| Peer {
                outbound: None,
                buffer: Vec::new(),
            });
            peer.outbound = Some(outbound.clone());
            std::mem::take(&mut peer.buffer)
        };
        for envelope in buffered {
            if outbound.send(envelope).await.is_err() {
                tracing::warn!(peer = %id, "buffered message dropped: peer channel closed");
            }
        }
    }

    /// Remove a peer. Buffered messages are dropped with a warning.
    pub fn unregister_peer(&self, id: &ProcessId) {
        let mut inner = self.inner.lock();
        if let Some(peer) = inner.peers.remove(id) {
            if !peer.buffer.is_empty() {
                tracing::warn!(
                    peer = %id,
                    dropped = peer.buffer.len(),
                    "peer unregistered with buffered messages"
                );
            }
        }
    }

    // -- sending --

    /// Deliver `message` to the addressed peer exactly once, buffering if
    /// the peer is registered but not yet ready.
    pub async fn send(&self, target: &ProcessId, message: Message) -> Result<(), TransportError> {
        if *target == self.id {
            // Sending to self loops through the local dispatcher.
            return self.broadcast_local(message).await;
        }
        let envelope = Envelope::new(self.id.clone(), Some(target.clone()), message);
        let outbound = {
            let mut inner = self.inner.lock();
            if !inner.known.contains(target) {
                return Err(TransportError::UnknownPeer(target.clone()));
            }
            match inner.peers.get_mut(target) {
                None => return Err(TransportError::PeerGone(target.clone())),
                Some(peer) => match &peer.outbound {
                    None => {
                        peer.buffer.push(envelope);
                        return Ok(());
                    }
                    Some(outbound) => outbound.clone(),
                },
            }
        };
        outbound
            .send(envelope)
            .await
            .map_err(|_| TransportError::PeerGone(target.clone()))
    }

    /// Deliver to every registered peer. On a child bus this routes up to
    /// the root, which delivers to its own subscribers.
    pub async fn broadcast(&self, message: Message) -> Result<(), TransportError> {
        if self.is_child {
            return self.send(&ProcessId::root(), message).await;
        }
        self.fan_out(message, None).await;
        Ok(())
    }

    /// Deliver only to in-process subscribers; never crosses a process
    /// boundary.
    pub async fn broadcast_local(&self, message: Message) -> Result<(), TransportError> {
        let envelope = Envelope::new(self.id.clone(), Some(self.id.clone()), message);
        self.inbound_tx
            .send(envelope)
            .await
            .map_err(|_| TransportError::PeerGone(self.id.clone()))
    }

    /// From the root: behave as [`Bus::broadcast`]. From a child: ask the
    /// root to re-fan to every process, subscribers and peers alike.
    pub async fn broadcast_universally(&self, message: Message) -> Result<(), TransportError> {
        if self.is_child {
            return self
                .send(
                    &ProcessId::root(),
                    Message::Broadcast {
                        message: Box::new(message),
                    },
                )
                .await;
        }
        self.broadcast_local(message.clone()).await?;
        self.fan_out(message, None).await;
        Ok(())
    }

    /// Send to every registered peer, buffering for the not-yet-ready.
    async fn fan_out(&self, message: Message, skip: Option<&ProcessId>) {
        let targets = {
            let inner = self.inner.lock();
            inner
                .peers
                .keys()
                .filter(|id| skip != Some(*id))
                .cloned()
                .collect::<Vec<_>>()
        };
        for target in targets {
            if let Err(e) = self.send(&target, message.clone()).await {
                tracing::warn!(peer = %target, error = %e, "broadcast delivery failed");
            }
        }
    }

    // -- subscriptions --

    /// Subscribe to every message of `kind`.
    pub fn on<F>(&self, kind: MessageKind, handler: F) -> u64
    where
        F: Fn(Message, ProcessId) + Send + Sync + 'static,
    {
        self.subscribe(kind, None, None, false, Arc::new(handler))
    }

    /// Subscribe to the next message of `kind`; fires exactly once even if
    /// several matches are queued.
    pub fn once<F>(&self, kind: MessageKind, handler: F) -> u64
    where
        F: Fn(Message, ProcessId) + Send + Sync + 'static,
    {
        self.subscribe(kind, None, None, true, Arc::new(handler))
    }

    /// Subscribe to the next message of `kind` from a specific source.
    pub fn once_from<F>(&self, source: ProcessId, kind: MessageKind, handler: F) -> u64
    where
        F: Fn(Message, ProcessId) + Send + Sync + 'static,
    {
        self.subscribe(kind, Some(source), None, true, Arc::new(handler))
    }

    /// Remove a subscription by the id `on`/`once` returned.
    pub fn off(&self, subscription_id: u64) {
        self.inner
            .lock()
            .subscriptions
            .retain(|s| s.id != subscription_id);
    }

    /// Completion resolving with the next message of `kind`.
    pub fn wait_for(&self, kind: MessageKind) -> oneshot::Receiver<(Message, ProcessId)> {
        self.wait_with(kind, None, None)
    }

    /// Completion resolving with the next message of `kind` from `source`.
    pub fn wait_for_from(
        &self,
        source: ProcessId,
        kind: MessageKind,
    ) -> oneshot::Receiver<(Message, ProcessId)> {
        self.wait_with(kind, Some(source), None)
    }

    /// Completion resolving with the next message of `kind` satisfying
    /// `predicate`. Request/response correlation helper.
    pub fn wait_for_match<P>(
        &self,
        kind: MessageKind,
        predicate: P,
    ) -> oneshot::Receiver<(Message, ProcessId)>
    where
        P: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.wait_with(kind, None, Some(Arc::new(predicate)))
    }

    fn wait_with(
        &self,
        kind: MessageKind,
        from: Option<ProcessId>,
        predicate: Option<Predicate>,
    ) -> oneshot::Receiver<(Message, ProcessId)> {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        self.subscribe(
            kind,
            from,
            predicate,
            true,
            Arc::new(move |message, source| {
                if let Some(tx) = slot.lock().take() {
                    let _ = tx.send((message, source));
                }
            }),
        );
        rx
    }

    fn subscribe(
        &self,
        kind: MessageKind,
        from: Option<ProcessId>,
        predicate: Option<Predicate>,
        once: bool,
        handler: Handler,
    ) -> u64 {
        let id = self.next_sub_id.fetch_add(1, Ordering::SeqCst);
        self.inner.lock().subscriptions.push(Subscription {
            id,
            kind,
            from,
            predicate,
            once,
            handler,
        });
        id
    }

    // -- dispatch --

    async fn route_inbound(&self, envelope: Envelope) {
        let Envelope {
            source, message, ..
        } = envelope;

        // A re-broadcast request from a child: deliver to local
        // subscribers and re-fan to every peer.
        if let Message::Broadcast { message } = message {
            if self.is_child {
                self.dispatch_local(*message, source);
            } else {
                let inner_message = *message;
                self.dispatch_local(inner_message.clone(), source.clone());
                self.fan_out(inner_message, None).await;
            }
            return;
        }

        self.dispatch_local(message, source);
    }

    /// Run matching handlers in registration order. `once` subscriptions
    /// are consumed by their first match, so a second buffered match only
    /// reaches the remaining subscribers.
    fn dispatch_local(&self, message: Message, source: ProcessId) {
        let kind = message.kind();
        let matched = {
            let mut inner = self.inner.lock();
            let mut matched = Vec::new();
            let mut fired_once = Vec::new();
            for sub in &inner.subscriptions {
                if sub.kind != kind {
                    continue;
                }
                if let Some(from) = &sub.from {
                    if *from != source {
                        continue;
                    }
                }
                if let Some(predicate) = &sub.predicate {
                    if !predicate(&message) {
                        continue;
                    }
                }
                matched.push(Arc::clone(&sub.handler));
                if sub.once {
                    fired_once.push(sub.id);
                }
            }
            inner.subscriptions.retain(|s| !fired_once.contains(&s.id));
            matched
        };

        if matched.is_empty() {
            tracing::debug!(kind = %kind, source = %source, "message had no subscribers");
        }
        for handler in matched {
            handler(message.clone(), source.clone());
        }
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("id", &self.id)
            .field("is_child", &self.is_child)
            .finish()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
