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

//! WebSocket transport: one JSON request per text or binary frame.

use std::sync::atomic::Ordering;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use super::listener::ConnectionContext;
use super::types::{ProtocolResponse, TransportError};

const REPLY_BUFFER: usize = 32;

fn text_frame<T: Serialize>(value: &T) -> Result<Message, TransportError> {
    Ok(Message::Text(serde_json::to_string(value)?))
}

pub(crate) async fn serve_connection(stream: TcpStream, mut context: ConnectionContext) {
    let conn_id = context.conn_id;
    let read_timeout = context.read_timeout();
    let handshake = tokio::time::timeout(read_timeout, tokio_tungstenite::accept_async(stream)).await;
    let socket = match handshake {
        Ok(Ok(socket)) => socket,
        Ok(Err(e)) => {
            context.stats.errors.fetch_add(1, Ordering::Relaxed);
            debug!(conn_id, error = %e, "WebSocket handshake failed");
            return;
        }
        Err(_) => {
            debug!(conn_id, "WebSocket handshake timed out");
            return;
        }
    };

    let (sink, mut source) = socket.split();
    let (push_tx, push_rx) = mpsc::channel(context.push_buffer_size());
    let (reply_tx, reply_rx) = mpsc::channel::<ProtocolResponse>(REPLY_BUFFER);
    context.register_push(push_tx);

    let max_size = context.max_message_size();
    let cancel_token = context.cancel_token.clone();
    debug!(conn_id, "WebSocket connection started");

    let read_side = async {
        let reply_tx = reply_tx;
        loop {
            let next = tokio::select! {
                biased;

                () = cancel_token.cancelled() => {
                    trace!(conn_id, "Connection received shutdown signal");
                    break;
                }

                next = tokio::time::timeout(read_timeout, source.next()) => next,
            };

            let message = match next {
                Ok(Some(Ok(message))) => message,
                Ok(Some(Err(e))) => {
                    context.stats.errors.fetch_add(1, Ordering::Relaxed);
                    debug!(conn_id, error = %e, "WebSocket read failed");
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    debug!(conn_id, "Closing idle connection");
                    break;
                }
            };

            let payload = match message {
                Message::Text(text) => text.into_bytes(),
                Message::Binary(bytes) => bytes,
                Message::Close(_) => {
                    debug!(conn_id, "Connection closed by client");
                    break;
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };

            let response = if payload.len() > max_size {
                warn!(conn_id, size = payload.len(), "Rejecting oversized message");
                ProtocolResponse::from_transport_error(
                    "unknown",
                    &TransportError::Protocol(format!("Message size {} exceeds maximum {max_size}", payload.len())),
                )
            } else {
                context.respond(&payload).await
            };
            if reply_tx.send(response).await.is_err() {
                break;
            }
        }
        drop(context);
    };

    let write_side = async move {
        let (mut sink, mut reply_rx, mut push_rx) = (sink, reply_rx, push_rx);
        loop {
            let frame = tokio::select! {
                biased;

                reply = reply_rx.recv() => match reply {
                    Some(response) => text_frame(&response),
                    None => break,
                },

                push = push_rx.recv() => match push {
                    Some(push) => text_frame(&push),
                    None => break,
                },
            };

            let sent = match frame {
                Ok(frame) => sink.send(frame).await.map_err(|e| TransportError::Io(e.to_string())),
                Err(e) => Err(e),
            };
            if let Err(e) = sent {
                debug!(conn_id, error = %e, "Write failed");
                break;
            }
        }
        let _ = sink.close().await;
    };

    tokio::join!(read_side, write_side);
}
