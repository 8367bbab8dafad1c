//! DNS over TCP delivery of a single encoded query

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::error::TransportError;

/// Sends one query to one address and returns the raw reply.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn exchange(&self, addr: SocketAddr, query: &[u8]) -> Result<Vec<u8>, TransportError>;
}

/// RFC 1035 4.2.2 TCP transport: two-byte length prefix on each message,
/// one connection per query.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
    read_timeout: Duration,
    max_response_size: usize,
}

impl TcpTransport {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            max_response_size: config.max_response_size,
        }
    }

    async fn send_tcp_query(
        &self,
        mut stream: TcpStream,
        query: &[u8],
    ) -> Result<Vec<u8>, TransportError> {
        let query_length = u16::try_from(query.len())
            .map_err(|_| TransportError::MessageTooLarge(query.len()))?;
        stream.write_all(&query_length.to_be_bytes()).await?;
        stream.write_all(query).await?;
        stream.flush().await?;

        let mut length_buf = [0u8; 2];
        stream.read_exact(&mut length_buf).await?;
        let response_length = u16::from_be_bytes(length_buf) as usize;
        if response_length > self.max_response_size {
            return Err(TransportError::MessageTooLarge(response_length));
        }

        let mut response_buf = vec![0; response_length];
        stream.read_exact(&mut response_buf).await?;

        trace!(
            "Raw TCP response data ({} bytes): {:02x?}",
            response_length,
            &response_buf[..response_length.min(64)]
        );
        Ok(response_buf)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn exchange(&self, addr: SocketAddr, query: &[u8]) -> Result<Vec<u8>, TransportError> {
        debug!("Sending {} byte TKEY query to {} over TCP", query.len(), addr);

        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout.as_millis()))??;

        timeout(self.read_timeout, self.send_tcp_query(stream, query))
            .await
            .map_err(|_| TransportError::Timeout(self.read_timeout.as_millis()))?
    }
}
