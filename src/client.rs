//! Client side of the command protocol

use crate::transport::{TransportConnector, TransportStream};
use anyhow::{bail, Context, Result};
use pulsegate_shared::codec::{self, FrameDecoder};
use pulsegate_shared::{CommandMessage, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Opens connections to the server through a connector
pub struct PulseClient<C> {
    connector: C,
}

impl<C: TransportConnector> PulseClient<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    /// Open a connection that can carry several requests
    pub async fn connect(&self) -> Result<ClientSession<C::Stream>> {
        let stream = self.connector.connect().await?;
        debug!("Connected to {}", self.connector.describe());
        Ok(ClientSession::new(stream))
    }

    /// Send one request on a fresh connection and return its response
    pub async fn request(&self, message: &CommandMessage) -> Result<Response> {
        let mut session = self.connect().await?;
        let response = session.request(message).await?;
        session.close().await?;
        Ok(response)
    }
}

/// An open connection to the server
pub struct ClientSession<S> {
    stream: S,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
}

impl<S: TransportStream> ClientSession<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            decoder: FrameDecoder::new(),
            read_buf: vec![0u8; 4096],
        }
    }

    /// Send a request and wait for its response
    pub async fn request(&mut self, message: &CommandMessage) -> Result<Response> {
        let frame = codec::encode_command(message)?;
        self.stream
            .write_all(&frame)
            .await
            .context("failed to send request")?;

        loop {
            if let Some(response) = self.decoder.decode_next_response()? {
                return Ok(response);
            }

            let n = self
                .stream
                .read(&mut self.read_buf)
                .await
                .context("failed to read response")?;
            if n == 0 {
                bail!("server closed the connection before responding");
            }
            self.decoder.extend(&self.read_buf[..n]);
        }
    }

    pub async fn close(mut self) -> Result<()> {
        TransportStream::shutdown(&mut self.stream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pulsegate_shared::Verb;
    use tokio::io::DuplexStream;

    #[async_trait]
    impl TransportStream for DuplexStream {
        async fn shutdown(&mut self) -> Result<()> {
            AsyncWriteExt::shutdown(self).await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_request_reads_one_response() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut session = ClientSession::new(client);

        let server_task = tokio::spawn(async move {
            let mut decoder = FrameDecoder::new();
            let mut buf = vec![0u8; 1024];
            loop {
                if let Some(msg) = decoder.decode_next().unwrap() {
                    assert_eq!(msg.verb(), Ok(Verb::Open));
                    break;
                }
                let n = server.read(&mut buf).await.unwrap();
                decoder.extend(&buf[..n]);
            }
            let reply = codec::encode(&Response::Error("Session busy".into()));
            server.write_all(&reply).await.unwrap();
        });

        let response = session.request(&CommandMessage::new(Verb::Open)).await.unwrap();
        assert_eq!(response, Response::Error("Session busy".into()));
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_hangup_is_error() {
        let (client, server) = tokio::io::duplex(1024);
        let mut session = ClientSession::new(client);
        drop(server);

        assert!(session.request(&CommandMessage::new(Verb::Stop)).await.is_err());
    }
}
