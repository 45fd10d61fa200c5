//! Network addressing and connection adapters
//!
//! Sites hand back a [`Conn`] regardless of how the bytes actually travel
//! (plain TCP, a recording forwarder, or an SSH subsystem on a peer proxy).

use crate::error::{Error, Result};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UnixStream};
use tracing::trace;

/// A network endpoint: the network kind ("tcp", "unix", ...) and its address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Addr {
    network: String,
    address: String,
}

impl Addr {
    /// Create an address on an arbitrary network
    pub fn new(network: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            address: address.into(),
        }
    }

    /// Create a TCP address
    pub fn tcp(address: impl Into<String>) -> Self {
        Self::new("tcp", address)
    }

    /// Create a Unix socket address
    pub fn unix(address: impl Into<String>) -> Self {
        Self::new("unix", address)
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

impl From<std::net::SocketAddr> for Addr {
    fn from(addr: std::net::SocketAddr) -> Self {
        Addr::tcp(addr.to_string())
    }
}

/// Split `host:port` (or `[host]:port`) into its parts
///
/// The port may be empty; a missing port or an unbracketed IPv6 host is an
/// error.
pub fn split_host_port(addr: &str) -> Result<(&str, &str)> {
    let invalid = |reason: &str| Error::InvalidAddress(format!("{}: {}", addr, reason));

    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| invalid("missing ']' in address"))?;
        let port = tail
            .strip_prefix(':')
            .ok_or_else(|| invalid("missing port in address"))?;
        return Ok((host, port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| invalid("missing port in address"))?;
    if host.contains(':') {
        return Err(invalid("too many colons in address"));
    }
    Ok((host, port))
}

/// Object-safe duplex byte stream
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// A connection produced by dialing a site
///
/// Carries the originating and destination addresses of the dial so that
/// upstream layers can log and make policy decisions without knowing the
/// transport. Dropping the connection releases everything the inner stream
/// owns.
pub struct Conn {
    inner: Box<dyn Stream>,
    local: Addr,
    remote: Addr,
}

impl Conn {
    pub fn new(inner: Box<dyn Stream>, local: Addr, remote: Addr) -> Self {
        Self {
            inner,
            local,
            remote,
        }
    }

    /// Address the dial originated from
    pub fn local_addr(&self) -> &Addr {
        &self.local
    }

    /// Address that was dialed
    pub fn remote_addr(&self) -> &Addr {
        &self.remote
    }

    /// Consume the connection and return the underlying stream
    pub fn into_inner(self) -> Box<dyn Stream> {
        self.inner
    }
}

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

impl AsyncRead for Conn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for Conn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Dial `to` directly over the network, without any tunnel
pub async fn dial_direct(from: &Addr, to: &Addr) -> Result<Conn> {
    let stream: Box<dyn Stream> = match to.network() {
        "tcp" | "tcp4" | "tcp6" => Box::new(TcpStream::connect(to.address()).await.map_err(
            |e| Error::Connection(format!("Failed to connect to {}: {}", to, e)),
        )?),
        "unix" => Box::new(UnixStream::connect(to.address()).await.map_err(|e| {
            Error::Connection(format!("Failed to connect to unix socket {}: {}", to, e))
        })?),
        other => {
            return Err(Error::Connection(format!(
                "Unsupported network '{}' for {}",
                other, to
            )));
        }
    };

    trace!(to = %to, network = to.network(), "Direct connection established");
    Ok(Conn::new(stream, from.clone(), to.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_addr_display_is_address() {
        let addr = Addr::tcp("10.0.0.5:22");
        assert_eq!(addr.to_string(), "10.0.0.5:22");
        assert_eq!(addr.network(), "tcp");
    }

    #[test]
    fn test_addr_from_socket_addr() {
        let sock: std::net::SocketAddr = "127.0.0.1:3022".parse().unwrap();
        let addr = Addr::from(sock);
        assert_eq!(addr, Addr::tcp("127.0.0.1:3022"));
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("node-1:3022").unwrap(), ("node-1", "3022"));
        assert_eq!(split_host_port("[::1]:22").unwrap(), ("::1", "22"));
        assert_eq!(split_host_port("host:").unwrap(), ("host", ""));
        assert!(split_host_port("node-1").is_err());
        assert!(split_host_port("::1").is_err());
        assert!(split_host_port("[::1]").is_err());
    }

    #[tokio::test]
    async fn test_conn_delegates_io() {
        let (a, mut b) = tokio::io::duplex(64);
        let mut conn = Conn::new(Box::new(a), Addr::tcp("src:1"), Addr::tcp("dst:2"));

        conn.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        b.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        b.write_all(b"pong").await.unwrap();
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        assert_eq!(conn.local_addr().address(), "src:1");
        assert_eq!(conn.remote_addr().address(), "dst:2");
    }

    #[tokio::test]
    async fn test_dial_direct_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let to = Addr::from(listener.local_addr().unwrap());

        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });
        let conn = dial_direct(&Addr::tcp("client:1"), &to).await.unwrap();
        assert_eq!(conn.remote_addr(), &to);
        accept.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_dial_direct_unsupported_network() {
        let err = dial_direct(&Addr::tcp("a:1"), &Addr::new("udp", "b:2"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported network"));
    }
}
