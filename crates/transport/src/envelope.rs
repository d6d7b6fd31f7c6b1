// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire envelope and framing.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload

use gantry_core::{Message, ProcessId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Maximum message size (16 MB). Dependency dictionaries ride inside
/// `test:execute`, so the cap is generous.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// A message plus its out-of-band addressing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub source: ProcessId,
    /// Addressed peer; `None` for messages the receiver routes itself
    /// (a child's upstream sends).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ProcessId>,
    pub message: Message,
}

impl Envelope {
    pub fn new(source: ProcessId, target: Option<ProcessId>, message: Message) -> Self {
        Self {
            source,
            target,
            message,
        }
    }
}

/// Framing and serialization failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed")]
    ConnectionClosed,
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Read one length-prefixed frame.
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed);
        }
        Err(e) => return Err(ProtocolError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write one length-prefixed frame.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    let len = data.len();
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    writer.write_all(&(len as u32).to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read and decode one [`Envelope`].
pub async fn read_envelope<R: AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<Envelope, ProtocolError> {
    let bytes = read_frame(reader).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Encode and write one [`Envelope`].
pub async fn write_envelope<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    envelope: &Envelope,
) -> Result<(), ProtocolError> {
    let data = serde_json::to_vec(envelope)?;
    write_frame(writer, &data).await
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
