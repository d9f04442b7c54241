//! Length-prefixed JSON channel between the bridge and its controller.
//!
//! # Wire format
//!
//! ```text
//! [4-byte big-endian length][UTF-8 JSON payload]
//! ```
//!
//! One transport owns one connection for the lifetime of the session.

use std::future::Future;
use std::io;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::TransportError;
use crate::global_variables::MAX_FRAME_SIZE;

const LENGTH_PREFIX: usize = 4;

#[derive(Debug)]
pub struct BridgeTransport<S> {
    stream: S,
    io_timeout: Option<Duration>,
    max_frame_size: usize,
}

impl BridgeTransport<TcpStream> {
    /// Open the single controller connection. No handshake follows the connect.
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| TransportError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> BridgeTransport<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            io_timeout: None,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    pub fn with_io_timeout(mut self, io_timeout: Option<Duration>) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Serialize `payload` as JSON and send it as one frame.
    pub async fn send<T: Serialize>(&mut self, payload: &T) -> Result<(), TransportError> {
        let bytes = serde_json::to_vec(payload).map_err(TransportError::Encode)?;
        self.send_frame(&bytes).await
    }

    /// Receive one frame and decode it. `Ok(None)` means the peer closed the
    /// stream cleanly before a new frame started.
    pub async fn receive<T: DeserializeOwned>(&mut self) -> Result<Option<T>, TransportError> {
        match self.receive_frame().await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(TransportError::Decode),
            None => Ok(None),
        }
    }

    pub async fn send_frame(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let frame = encode_frame(payload)?;
        let stream = &mut self.stream;
        with_timeout(self.io_timeout, async move {
            stream.write_all(&frame).await?;
            stream.flush().await?;
            Ok(())
        })
        .await
    }

    pub async fn receive_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let max_frame_size = self.max_frame_size;
        with_timeout(self.io_timeout, read_frame(&mut self.stream, max_frame_size)).await
    }

    /// Close the write side so the peer observes end-of-stream.
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Prefix `payload` with its big-endian length.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, TransportError> {
    let len = u32::try_from(payload.len()).map_err(|_| TransportError::FrameTooLarge {
        len: payload.len(),
        limit: u32::MAX as usize,
    })?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_size: usize,
) -> Result<Option<Vec<u8>>, TransportError> {
    let mut len_bytes = [0u8; LENGTH_PREFIX];
    let filled = read_full(reader, &mut len_bytes).await?;
    if filled == 0 {
        return Ok(None);
    }
    if filled < LENGTH_PREFIX {
        return Err(TransportError::Truncated {
            expected: LENGTH_PREFIX,
            received: filled,
        });
    }

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > max_frame_size {
        return Err(TransportError::FrameTooLarge {
            len,
            limit: max_frame_size,
        });
    }

    let mut body = vec![0u8; len];
    let received = read_full(reader, &mut body).await?;
    if received < len {
        return Err(TransportError::Truncated {
            expected: len,
            received,
        });
    }
    Ok(Some(body))
}

/// Read until `buf` is full or the stream ends. Returns the bytes read.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

async fn with_timeout<T, F>(limit: Option<Duration>, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| TransportError::Timeout {
                ms: limit.as_millis() as u64,
            })?,
        None => fut.await,
    }
}
