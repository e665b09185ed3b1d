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

//! Length-prefixed framing for the binary TCP transport.
//!
//! # Wire Format
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ Frame Length (4 bytes, big-endian u32, excludes header)       │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Protocol Version (1 byte, currently 0x01)                     │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Message Type (1 byte)                                         │
//! │   0x01 = Request                                              │
//! │   0x02 = Response                                             │
//! │   0x03 = Error                                                │
//! │   0x04 = Heartbeat                                            │
//! │   0x05 = Push                                                 │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Format (1 byte, 0x01 = JSON)                                  │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Payload                                                       │
//! └───────────────────────────────────────────────────────────────┘
//! ```

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::types::{ProtocolRequest, ProtocolResponse, PushNotification, TransportError};

/// Protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Format byte for JSON payloads.
pub const FORMAT_JSON: u8 = 0x01;

/// Message type: Request (client → server).
pub const MSG_TYPE_REQUEST: u8 = 0x01;

/// Message type: Response (server → client).
pub const MSG_TYPE_RESPONSE: u8 = 0x02;

/// Message type: Error response (server → client).
pub const MSG_TYPE_ERROR: u8 = 0x03;

/// Message type: Heartbeat (bidirectional).
pub const MSG_TYPE_HEARTBEAT: u8 = 0x04;

/// Message type: Push notification (server → client).
pub const MSG_TYPE_PUSH: u8 = 0x05;

/// Frame header size: 4 bytes length + 1 byte version + 1 byte type + 1 byte format.
pub const HEADER_SIZE: usize = 7;

/// Maximum frame size (16 MiB hard limit).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message type byte.
    pub msg_type: u8,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

fn read_error(e: &std::io::Error) -> TransportError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        TransportError::ConnectionClosed
    } else {
        TransportError::Io(e.to_string())
    }
}

/// Read a complete frame from the stream.
///
/// # Errors
///
/// `ConnectionClosed` on EOF; `Protocol` on a bad version, message type,
/// format, or a frame larger than `max_size`.
pub async fn read_frame<R>(reader: &mut R, max_size: usize) -> Result<Frame, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await.map_err(|e| read_error(&e))?;

    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let version = header[4];
    let msg_type = header[5];
    let format = header[6];

    if version != PROTOCOL_VERSION {
        return Err(TransportError::Protocol(format!(
            "Unsupported protocol version: {version}, expected {PROTOCOL_VERSION}"
        )));
    }

    if !matches!(
        msg_type,
        MSG_TYPE_REQUEST | MSG_TYPE_RESPONSE | MSG_TYPE_ERROR | MSG_TYPE_HEARTBEAT | MSG_TYPE_PUSH
    ) {
        return Err(TransportError::Protocol(format!(
            "Unknown message type: {msg_type:#04x}"
        )));
    }

    if format != FORMAT_JSON {
        return Err(TransportError::Protocol(format!(
            "Unknown serialization format: {format:#04x}"
        )));
    }

    if length > max_size.min(MAX_FRAME_SIZE) {
        return Err(TransportError::Protocol(format!(
            "Frame size {length} exceeds maximum {}",
            max_size.min(MAX_FRAME_SIZE)
        )));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await.map_err(|e| read_error(&e))?;

    Ok(Frame { msg_type, payload })
}

/// Write a frame to the stream.
///
/// # Errors
///
/// Returns `Protocol` when the payload does not fit a `u32` length, or the
/// underlying I/O error.
pub async fn write_frame<W>(writer: &mut W, msg_type: u8, payload: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let length: u32 = payload
        .len()
        .try_into()
        .map_err(|_| TransportError::Protocol("Payload too large for u32".to_string()))?;

    let mut header = [0u8; HEADER_SIZE];
    header[..4].copy_from_slice(&length.to_be_bytes());
    header[4] = PROTOCOL_VERSION;
    header[5] = msg_type;
    header[6] = FORMAT_JSON;

    writer.write_all(&header).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

async fn write_json<W, T>(writer: &mut W, msg_type: u8, value: &T) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(value)?;
    write_frame(writer, msg_type, &payload).await
}

fn decode<T: DeserializeOwned>(frame: &Frame) -> Result<T, TransportError> {
    serde_json::from_slice(&frame.payload).map_err(TransportError::from)
}

/// Write a request frame. Used by clients.
///
/// # Errors
///
/// Serialization or I/O failure.
pub async fn write_request<W>(writer: &mut W, request: &ProtocolRequest) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    write_json(writer, MSG_TYPE_REQUEST, request).await
}

/// Write a response frame. Failed responses use the error message type.
///
/// # Errors
///
/// Serialization or I/O failure.
pub async fn write_response<W>(writer: &mut W, response: &ProtocolResponse) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let msg_type = if response.success {
        MSG_TYPE_RESPONSE
    } else {
        MSG_TYPE_ERROR
    };
    write_json(writer, msg_type, response).await
}

/// Read a response frame, skipping heartbeats and pushes. Used by clients.
///
/// # Errors
///
/// Framing, serialization or I/O failure.
pub async fn read_response<R>(reader: &mut R, max_size: usize) -> Result<ProtocolResponse, TransportError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = read_frame(reader, max_size).await?;
        match frame.msg_type {
            MSG_TYPE_RESPONSE | MSG_TYPE_ERROR => return decode(&frame),
            MSG_TYPE_HEARTBEAT | MSG_TYPE_PUSH => continue,
            other => {
                return Err(TransportError::Protocol(format!(
                    "Expected response message type, got {other:#04x}"
                )))
            }
        }
    }
}

/// Write a heartbeat frame.
///
/// # Errors
///
/// I/O failure.
pub async fn write_heartbeat<W>(writer: &mut W) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    write_frame(writer, MSG_TYPE_HEARTBEAT, &[]).await
}

/// Write a push notification frame.
///
/// # Errors
///
/// Serialization or I/O failure.
pub async fn write_push<W>(writer: &mut W, push: &PushNotification) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    write_json(writer, MSG_TYPE_PUSH, push).await
}

/// Read a push notification frame, skipping heartbeats. Used by clients.
///
/// # Errors
///
/// Framing, serialization or I/O failure.
pub async fn read_push<R>(reader: &mut R, max_size: usize) -> Result<PushNotification, TransportError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = read_frame(reader, max_size).await?;
        match frame.msg_type {
            MSG_TYPE_PUSH => return decode(&frame),
            MSG_TYPE_HEARTBEAT => continue,
            other => {
                return Err(TransportError::Protocol(format!(
                    "Expected push message type ({MSG_TYPE_PUSH:#04x}), got {other:#04x}"
                )))
            }
        }
    }
}

/// Check if a message type is a heartbeat.
#[must_use]
pub const fn is_heartbeat(msg_type: u8) -> bool {
    msg_type == MSG_TYPE_HEARTBEAT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Value;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_frame_header_layout() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, MSG_TYPE_REQUEST, b"{}").await.unwrap();

        assert_eq!(buffer.len(), HEADER_SIZE + 2);
        assert_eq!(&buffer[..4], &2u32.to_be_bytes());
        assert_eq!(buffer[4], PROTOCOL_VERSION);
        assert_eq!(buffer[5], MSG_TYPE_REQUEST);
        assert_eq!(buffer[6], FORMAT_JSON);
    }

    #[tokio::test]
    async fn test_request_frame_decodes() {
        let request = ProtocolRequest::new("binary", "system.ping", Value::Null);
        let mut buffer = Vec::new();
        write_request(&mut buffer, &request).await.unwrap();

        let frame = read_frame(&mut Cursor::new(buffer), 1024).await.unwrap();
        assert_eq!(frame.msg_type, MSG_TYPE_REQUEST);
        let decoded: ProtocolRequest = decode(&frame).unwrap();
        assert_eq!(decoded.id, request.id);
    }

    #[tokio::test]
    async fn test_rejects_wrong_version() {
        let buffer = vec![0, 0, 0, 0, 0x09, MSG_TYPE_REQUEST, FORMAT_JSON];
        let err = read_frame(&mut Cursor::new(buffer), 1024).await.unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_rejects_oversized_frame() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, MSG_TYPE_REQUEST, &[b' '; 64]).await.unwrap();
        let err = read_frame(&mut Cursor::new(buffer), 16).await.unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_eof_is_connection_closed() {
        let err = read_frame(&mut Cursor::new(Vec::<u8>::new()), 16).await.unwrap_err();
        assert_eq!(err, TransportError::ConnectionClosed);
    }

    #[tokio::test]
    async fn test_read_response_skips_heartbeat() {
        let mut buffer = Vec::new();
        write_heartbeat(&mut buffer).await.unwrap();
        let response = ProtocolResponse::failure("req_1", "NOT_FOUND", "missing");
        write_response(&mut buffer, &response).await.unwrap();
        assert_eq!(buffer[5], MSG_TYPE_HEARTBEAT);

        let decoded = read_response(&mut Cursor::new(buffer), 1024).await.unwrap();
        assert_eq!(decoded.id, "req_1");
        assert!(!decoded.success);
    }
}
