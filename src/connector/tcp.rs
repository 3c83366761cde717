use super::Connector;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

/// Connector for plain TCP streams to a single upstream address.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: SocketAddr,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(address: SocketAddr, connect_timeout: Duration) -> Self {
        Self {
            address,
            connect_timeout,
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Connection = TcpStream;
    type Error = std::io::Error;

    /// Create a new TCP connection with timeout
    async fn create(&self) -> std::io::Result<TcpStream> {
        match timeout(self.connect_timeout, TcpStream::connect(self.address)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    trace!("Failed to set TCP_NODELAY on {}: {}", self.address, e);
                }
                Ok(stream)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!(
                    "Connection to {} timed out after {:?}",
                    self.address, self.connect_timeout
                ),
            )),
        }
    }

    async fn destroy(&self, mut stream: TcpStream) -> std::io::Result<()> {
        match stream.shutdown().await {
            Ok(()) => Ok(()),
            // The peer already went away; the stream is closed either way.
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e),
        }
    }
}
