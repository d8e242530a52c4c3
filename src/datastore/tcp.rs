//! Implementation of [Connector] for a TCP-reachable datastore.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::datastore::{Connector, Error};

/// An established link to the datastore.
#[derive(Debug)]
pub struct TcpLink {
    peer: SocketAddr,
    stream: Mutex<TcpStream>,
}

impl TcpLink {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Exclusive access to the underlying stream.
    pub async fn stream(&self) -> tokio::sync::MutexGuard<'_, TcpStream> {
        self.stream.lock().await
    }
}

#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Handle = Arc<TcpLink>;

    async fn connect(&self) -> Result<Self::Handle, Error> {
        let stream = TcpStream::connect(&self.address).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        Ok(Arc::new(TcpLink {
            peer,
            stream: Mutex::new(stream),
        }))
    }

    async fn close(&self, handle: Self::Handle) {
        let mut stream = handle.stream.lock().await;
        if let Err(e) = stream.shutdown().await {
            tracing::debug!(peer = %handle.peer, error = %e, "Error shutting down datastore link");
        }
    }

    fn target(&self) -> String {
        self.address.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connects_to_listening_target() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let connector = TcpConnector::new(addr.to_string());
        let link = connector.connect().await.unwrap();
        assert_eq!(link.peer(), addr);
        connector.close(link).await;
    }

    #[tokio::test]
    async fn refused_target_is_io_error() {
        // Bind then drop to get a port with nothing behind it.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let connector = TcpConnector::new(addr.to_string());
        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
