/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! gRPC length-prefixed message framing over a plain TCP stream.
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────┬─────────┐
//! │ Compressed (1 byte)  │ Length (4 bytes, big-endian) │ Payload │
//! └──────────────────────┴──────────────────────────────┴─────────┘
//! ```
//!
//! Payloads are JSON `ProtocolRequest`s inbound and `ProtocolResponse`s or
//! `PushNotification`s outbound. Compression is not supported.

use std::sync::atomic::Ordering;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::listener::ConnectionContext;
use super::types::{ProtocolRequest, ProtocolResponse, TransportError};

const REPLY_BUFFER: usize = 32;

/// Size of the message prefix.
pub const PREFIX_SIZE: usize = 5;

/// Read one length-prefixed message.
///
/// # Errors
///
/// `ConnectionClosed` on EOF; `Protocol` for compressed or oversized messages.
pub async fn read_message<R>(reader: &mut R, max_size: usize) -> Result<Vec<u8>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; PREFIX_SIZE];
    reader.read_exact(&mut prefix).await?;

    if prefix[0] != 0 {
        return Err(TransportError::Protocol(
            "Compressed gRPC messages are not supported".to_string(),
        ));
    }
    let length = u32::from_be_bytes([prefix[1], prefix[2], prefix[3], prefix[4]]) as usize;
    if length > max_size {
        return Err(TransportError::Protocol(format!(
            "Message size {length} exceeds maximum {max_size}"
        )));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Write one uncompressed length-prefixed message.
///
/// # Errors
///
/// `Protocol` when the payload does not fit a `u32` length, or the I/O error.
pub async fn write_message<W>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let length: u32 = payload
        .len()
        .try_into()
        .map_err(|_| TransportError::Protocol("Payload too large for u32".to_string()))?;

    let mut prefix = [0u8; PREFIX_SIZE];
    prefix[1..].copy_from_slice(&length.to_be_bytes());
    writer.write_all(&prefix).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Serialize `value` as JSON and write it as one message.
///
/// # Errors
///
/// Serialization or I/O failure.
pub async fn write_json<W, T>(writer: &mut W, value: &T) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(value)?;
    write_message(writer, &payload).await
}

/// Write a request. Used by clients.
///
/// # Errors
///
/// Serialization or I/O failure.
pub async fn write_request<W>(writer: &mut W, request: &ProtocolRequest) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    write_json(writer, request).await
}

/// Read the next response, skipping push notifications. Used by clients.
///
/// # Errors
///
/// Framing, serialization or I/O failure.
pub async fn read_response<R>(reader: &mut R, max_size: usize) -> Result<ProtocolResponse, TransportError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let payload = read_message(reader, max_size).await?;
        let json: serde_json::Value = serde_json::from_slice(&payload)?;
        if json.get("success").is_some() {
            return serde_json::from_value(json).map_err(TransportError::from);
        }
    }
}

/// Serves one gRPC-framed connection. Push notifications share the outbound stream.
pub(crate) async fn serve_connection(stream: TcpStream, mut context: ConnectionContext) {
    let (mut reader, writer) = stream.into_split();
    let (push_tx, push_rx) = mpsc::channel(context.push_buffer_size());
    let (reply_tx, reply_rx) = mpsc::channel::<ProtocolResponse>(REPLY_BUFFER);
    context.register_push(push_tx);

    let conn_id = context.conn_id;
    let max_size = context.max_message_size();
    let read_timeout = context.read_timeout();
    let cancel_token = context.cancel_token.clone();
    debug!(conn_id, "gRPC connection started");

    let read_side = async {
        let reply_tx = reply_tx;
        loop {
            let next = tokio::select! {
                biased;

                () = cancel_token.cancelled() => break,

                next = tokio::time::timeout(read_timeout, read_message(&mut reader, max_size)) => next,
            };

            let payload = match next {
                Ok(Ok(payload)) => payload,
                Ok(Err(TransportError::ConnectionClosed)) => break,
                Ok(Err(e)) => {
                    context.stats.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(conn_id, error = %e, "Closing connection after framing error");
                    let _ = reply_tx.send(ProtocolResponse::from_transport_error("unknown", &e)).await;
                    break;
                }
                Err(_) => {
                    debug!(conn_id, "Closing idle connection");
                    break;
                }
            };

            let response = context.respond(&payload).await;
            if reply_tx.send(response).await.is_err() {
                break;
            }
        }
        drop(context);
    };

    let write_side = async move {
        let (mut writer, mut reply_rx, mut push_rx) = (writer, reply_rx, push_rx);
        loop {
            let written = tokio::select! {
                biased;

                reply = reply_rx.recv() => match reply {
                    Some(response) => write_json(&mut writer, &response).await,
                    None => break,
                },

                push = push_rx.recv() => match push {
                    Some(push) => write_json(&mut writer, &push).await,
                    None => break,
                },
            };
            if let Err(e) = written {
                debug!(conn_id, error = %e, "Write failed");
                break;
            }
        }
    };

    tokio::join!(read_side, write_side);
}
