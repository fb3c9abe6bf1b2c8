//! TCP streams carrying address book connections.
//!
//! Both ends disable Nagle's algorithm: commands are small and a request
//! should not wait for the next one to fill a segment.
//!
//! # Example
//!
//! ```ignore
//! use remote_address_book::transport::{connect, AddressBookListener};
//!
//! let listener = AddressBookListener::bind("127.0.0.1:0".parse()?).await?;
//! let stream = connect(listener.local_addr()?, Duration::from_secs(10)).await?;
//! let (accepted, peer) = listener.accept().await?;
//! ```

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{RemoteAddressBookError, Result};

/// Open a connection to `addr`, giving up after `timeout`.
pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<AddressBookStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| {
            RemoteAddressBookError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect to {addr} timed out after {timeout:?}"),
            ))
        })??;
    AddressBookStream::new(stream)
}

/// TCP listener accepting address book connections.
pub struct AddressBookListener {
    listener: TcpListener,
}

impl AddressBookListener {
    /// Bind to `addr`. Port 0 picks a free port.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Accept a single connection.
    pub async fn accept(&self) -> Result<(AddressBookStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        Ok((AddressBookStream::new(stream)?, peer))
    }

    /// Get the bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// A connected TCP stream.
pub struct AddressBookStream {
    stream: TcpStream,
}

impl AddressBookStream {
    fn new(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Address of the other end.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Get a reference to the underlying stream.
    pub fn inner(&self) -> &TcpStream {
        &self.stream
    }
}

impl AsyncRead for AddressBookStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for AddressBookStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_connect_and_accept() {
        let listener = AddressBookListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let (client, accepted) = tokio::join!(connect(addr, Duration::from_secs(5)), listener.accept());
        let mut client = client.unwrap();
        let (mut server, peer) = accepted.unwrap();

        assert_eq!(client.peer_addr().unwrap(), addr);
        assert_eq!(server.peer_addr().unwrap(), peer);
        assert!(client.inner().nodelay().unwrap());

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to find a port nobody listens on.
        let addr = {
            let listener = AddressBookListener::bind("127.0.0.1:0".parse().unwrap())
                .await
                .unwrap();
            listener.local_addr().unwrap()
        };

        let result = connect(addr, Duration::from_secs(5)).await;

        assert!(matches!(result, Err(RemoteAddressBookError::Io(_))));
    }
}
