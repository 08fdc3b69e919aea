//! Single client connection handling

use anyhow::{bail, Context, Result};
use pulsegate_shared::codec::{self, CodecError, FrameDecoder};
use pulsegate_shared::{CommandMessage, Response};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};

/// What arrived in one frame
#[derive(Debug)]
pub enum Inbound {
    Command(CommandMessage),
    /// A frame that could not be decoded; the stream is still in sync
    Malformed(CodecError),
}

/// An accepted client connection and its partially received frame
pub struct ClientConnection<S = TcpStream> {
    peer: SocketAddr,
    stream: S,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
    read_timeout: Duration,
}

impl<S> ClientConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: SocketAddr, read_timeout: Duration) -> Self {
        Self {
            peer,
            stream,
            decoder: FrameDecoder::new(),
            read_buf: vec![0u8; 4096],
            read_timeout,
        }
    }

    /// Remote address
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Read the next frame from this connection
    /// Returns `Ok(None)` once the peer has closed the connection
    ///
    /// The whole frame must arrive within `read_timeout` of the call, however
    /// the bytes are spread over reads.
    pub async fn recv(&mut self) -> Result<Option<Inbound>> {
        let deadline = Instant::now() + self.read_timeout;
        loop {
            // First try to decode from existing buffer
            match self.decoder.decode_next() {
                Ok(Some(message)) => return Ok(Some(Inbound::Command(message))),
                Ok(None) => {
                    // Need more data
                }
                Err(e) if e.is_recoverable() => return Ok(Some(Inbound::Malformed(e))),
                Err(e) => return Err(e).context("unrecoverable framing error"),
            }

            // Read more data
            let n = timeout_at(deadline, self.stream.read(&mut self.read_buf))
                .await
                .with_context(|| {
                    format!("no complete frame within {:?}", self.read_timeout)
                })?
                .context("read failed")?;

            if n == 0 {
                if self.decoder.buffer_len() > 0 {
                    bail!(
                        "client disconnected while receiving ({} bytes pending)",
                        self.decoder.buffer_len()
                    );
                }
                return Ok(None);
            }
            self.decoder.extend(&self.read_buf[..n]);
        }
    }

    /// Encode and write one response frame
    pub async fn send(&mut self, response: &Response) -> Result<()> {
        let encoded = codec::encode(response);
        self.stream
            .write_all(&encoded)
            .await
            .context("write failed")?;
        self.stream.flush().await.context("flush failed")?;
        Ok(())
    }

    /// Close the write side
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
