//! Message framing for the TCP transport
//!
//! Every frame is `[4 bytes little-endian length][payload]`. The first frame on
//! a fresh stream is a [`Hello`] naming the dialing peer; every frame after
//! that is one JSON-encoded [`PeerMessage`].

use std::io;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::game::constants::net::MAX_MESSAGE_SIZE;
use crate::game::state::PeerId;
use crate::net::protocol::{self, PeerMessage};

/// Errors that can occur during message framing
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message too large: {0} bytes (max {1})")]
    MessageTooLarge(usize, usize),
    #[error("Malformed frame: {0}")]
    Malformed(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Handshake frame sent by the dialing side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    pub peer_id: PeerId,
}

/// Read a length-prefixed message from a stream
pub async fn read_message<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Vec<u8>, FramingError> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(FramingError::ConnectionClosed);
        }
        Err(e) => return Err(FramingError::Io(e)),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge(len, MAX_MESSAGE_SIZE));
    }
    if len == 0 {
        return Ok(Vec::new());
    }

    let mut buf = vec![0u8; len];
    match stream.read_exact(&mut buf).await {
        Ok(_) => Ok(buf),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(FramingError::ConnectionClosed),
        Err(e) => Err(FramingError::Io(e)),
    }
}

/// Write a length-prefixed message to a stream
pub async fn write_message<W: AsyncWrite + Unpin>(
    stream: &mut W,
    data: &[u8],
) -> Result<(), FramingError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge(data.len(), MAX_MESSAGE_SIZE));
    }

    let len_bytes = (data.len() as u32).to_le_bytes();
    stream.write_all(&len_bytes).await?;
    stream.write_all(data).await?;
    stream.flush().await?;

    Ok(())
}

pub async fn write_hello<W: AsyncWrite + Unpin>(
    stream: &mut W,
    peer_id: &str,
) -> Result<(), FramingError> {
    let hello = Hello {
        peer_id: peer_id.to_string(),
    };
    let data = serde_json::to_vec(&hello).map_err(|e| FramingError::Malformed(e.to_string()))?;
    write_message(stream, &data).await
}

pub async fn read_hello<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Hello, FramingError> {
    let data = read_message(stream).await?;
    serde_json::from_slice(&data).map_err(|e| FramingError::Malformed(e.to_string()))
}

/// Encode and frame one peer message
pub async fn write_peer_message<W: AsyncWrite + Unpin>(
    stream: &mut W,
    message: &PeerMessage,
) -> Result<(), FramingError> {
    let data = protocol::encode(message).map_err(|e| FramingError::Malformed(e.to_string()))?;
    write_message(stream, &data).await
}

/// Read and decode one peer message
pub async fn read_peer_message<R: AsyncRead + Unpin>(
    stream: &mut R,
) -> Result<PeerMessage, FramingError> {
    let data = read_message(stream).await?;
    protocol::decode(&data).map_err(|e| FramingError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_read_write_message() {
        let data = b"Hello, World!";
        let mut buffer = Vec::new();

        write_message(&mut buffer, data).await.unwrap();

        let mut cursor = Cursor::new(buffer);
        let result = read_message(&mut cursor).await.unwrap();

        assert_eq!(result, data);
    }

    #[tokio::test]
    async fn test_empty_message() {
        let mut buffer = Vec::new();
        write_message(&mut buffer, b"").await.unwrap();

        let mut cursor = Cursor::new(buffer);
        assert!(read_message(&mut cursor).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_message_too_large() {
        let large_data = vec![0u8; MAX_MESSAGE_SIZE + 1];
        let mut buffer = Vec::new();

        let result = write_message(&mut buffer, &large_data).await;
        assert!(matches!(result, Err(FramingError::MessageTooLarge(_, _))));
    }

    #[tokio::test]
    async fn test_oversized_length_prefix_rejected() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&((MAX_MESSAGE_SIZE as u32) + 1).to_le_bytes());

        let mut cursor = Cursor::new(buffer);
        let result = read_message(&mut cursor).await;
        assert!(matches!(result, Err(FramingError::MessageTooLarge(_, _))));
    }

    #[tokio::test]
    async fn test_read_truncated_payload() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&10u32.to_le_bytes());
        buffer.extend_from_slice(&[1, 2, 3]);

        let mut cursor = Cursor::new(buffer);
        let result = read_message(&mut cursor).await;
        assert!(matches!(result, Err(FramingError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_hello_then_messages() {
        let mut buffer = Vec::new();
        write_hello(&mut buffer, "127.0.0.1:4000").await.unwrap();
        write_peer_message(&mut buffer, &PeerMessage::PlayerDisconnected { id: "x".into() })
            .await
            .unwrap();

        let mut cursor = Cursor::new(buffer);
        assert_eq!(read_hello(&mut cursor).await.unwrap().peer_id, "127.0.0.1:4000");
        assert_eq!(
            read_peer_message(&mut cursor).await.unwrap(),
            PeerMessage::PlayerDisconnected { id: "x".into() }
        );
        assert!(matches!(
            read_peer_message(&mut cursor).await,
            Err(FramingError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_frame_split_across_reads() {
        let mut stream = tokio_test::io::Builder::new()
            .read(&[5, 0])
            .read(&[0, 0, b'h'])
            .read(b"ell")
            .read(b"o")
            .build();

        assert_eq!(read_message(&mut stream).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_bad_json_is_malformed() {
        let mut buffer = Vec::new();
        write_message(&mut buffer, b"{oops").await.unwrap();

        let mut cursor = Cursor::new(buffer);
        assert!(matches!(
            read_peer_message(&mut cursor).await,
            Err(FramingError::Malformed(_))
        ));
    }
}
