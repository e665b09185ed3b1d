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

//! Binary TCP transport: one framed JSON request per request frame.

use std::sync::atomic::Ordering;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::listener::ConnectionContext;
use super::types::{ProtocolResponse, TransportError};
use super::wire::{
    is_heartbeat, read_frame, write_heartbeat, write_push, write_response, MSG_TYPE_REQUEST,
};

const REPLY_BUFFER: usize = 32;

enum Outgoing {
    Response(ProtocolResponse),
    Heartbeat,
}

pub(crate) async fn serve_connection(stream: TcpStream, mut context: ConnectionContext) {
    let (mut reader, writer) = stream.into_split();
    let (push_tx, push_rx) = mpsc::channel(context.push_buffer_size());
    let (reply_tx, reply_rx) = mpsc::channel::<Outgoing>(REPLY_BUFFER);
    context.register_push(push_tx);

    let conn_id = context.conn_id;
    let max_size = context.max_message_size();
    let read_timeout = context.read_timeout();
    let cancel_token = context.cancel_token.clone();
    debug!(conn_id, "Binary connection started");

    let read_side = async {
        let reply_tx = reply_tx;
        loop {
            let next = tokio::select! {
                biased;

                () = cancel_token.cancelled() => {
                    trace!(conn_id, "Connection received shutdown signal");
                    break;
                }

                next = tokio::time::timeout(read_timeout, read_frame(&mut reader, max_size)) => next,
            };

            let frame = match next {
                Ok(Ok(frame)) => frame,
                Ok(Err(TransportError::ConnectionClosed)) => {
                    debug!(conn_id, "Connection closed by client");
                    break;
                }
                Ok(Err(e)) => {
                    context.stats.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(conn_id, error = %e, "Closing connection after framing error");
                    let response = ProtocolResponse::from_transport_error("unknown", &e);
                    let _ = reply_tx.send(Outgoing::Response(response)).await;
                    break;
                }
                Err(_) => {
                    debug!(conn_id, "Closing idle connection");
                    break;
                }
            };

            let outgoing = if is_heartbeat(frame.msg_type) {
                Outgoing::Heartbeat
            } else if frame.msg_type == MSG_TYPE_REQUEST {
                Outgoing::Response(context.respond(&frame.payload).await)
            } else {
                warn!(conn_id, "Unexpected message type: {:#04x}", frame.msg_type);
                continue;
            };
            if reply_tx.send(outgoing).await.is_err() {
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
                    Some(Outgoing::Response(response)) => write_response(&mut writer, &response).await,
                    Some(Outgoing::Heartbeat) => write_heartbeat(&mut writer).await,
                    None => break,
                },

                push = push_rx.recv() => match push {
                    Some(push) => write_push(&mut writer, &push).await,
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
