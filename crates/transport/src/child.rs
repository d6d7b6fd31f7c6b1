// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-side bus bootstrap.

use crate::bus::{Bus, TransportError};
use crate::envelope::{read_envelope, write_envelope, ProtocolError};
use gantry_core::WorkerId;
use std::path::Path;
use tokio::net::UnixStream;
use tokio::sync::mpsc;

/// Connect this worker process to the root socket and return its bus with
/// the root peer wired up. The caller must send `worker:hello` as its
/// first message; that is what flips the root-side buffer to live
/// delivery.
pub async fn connect_worker(
    socket_path: &Path,
    worker_id: WorkerId,
) -> Result<Bus, TransportError> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(ProtocolError::Io)?;
    let (mut read_half, mut write_half) = stream.into_split();

    let (outbound_tx, mut outbound_rx) = mpsc::channel(256);
    let bus = Bus::child(worker_id.process_id(), outbound_tx);

    tokio::spawn(async move {
        while let Some(envelope) = outbound_rx.recv().await {
            if let Err(e) = write_envelope(&mut write_half, &envelope).await {
                tracing::warn!(error = %e, "write to root failed");
                break;
            }
        }
    });

    let inbound = bus.inbound_sender();
    tokio::spawn(async move {
        loop {
            match read_envelope(&mut read_half).await {
                Ok(envelope) => {
                    if inbound.send(envelope).await.is_err() {
                        break;
                    }
                }
                Err(ProtocolError::ConnectionClosed) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "read from root failed");
                    break;
                }
            }
        }
    });

    Ok(bus)
}
