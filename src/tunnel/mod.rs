//! Tunnel connections and the transport used to reach peer proxies
//!
//! - [`TunnelConnection`]: descriptor of one registered tunnel
//! - [`TunnelDialer`], [`TunnelClient`], [`TunnelSession`]: outbound SSH
//!   transport to a peer proxy
//! - [`PipeConn`]: the session's stdio exposed as a stream that owns the
//!   session and client
//! - [`SshTunnelDialer`]: russh-backed transport

mod ssh;

pub use ssh::{SshTunnelConfig, SshTunnelDialer};

use crate::error::Result;
use crate::net::{Addr, Stream};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// A tunnel registered by one proxy replica of a remote cluster
///
/// Owned by the registration component. Sites only read it and replace it
/// wholesale when a new heartbeat arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelConnection {
    name: String,
    cluster_name: String,
    proxy_addr: String,
    last_heartbeat: DateTime<Utc>,
}

impl TunnelConnection {
    pub fn new(
        name: impl Into<String>,
        cluster_name: impl Into<String>,
        proxy_addr: impl Into<String>,
        last_heartbeat: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            cluster_name: cluster_name.into(),
            proxy_addr: proxy_addr.into(),
            last_heartbeat,
        }
    }

    /// Unique name of the tunnel connection
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Address the peer proxy listens on
    pub fn proxy_addr(&self) -> &str {
        &self.proxy_addr
    }

    pub fn last_heartbeat(&self) -> DateTime<Utc> {
        self.last_heartbeat
    }

    /// Copy of this descriptor with a newer heartbeat
    pub fn with_heartbeat(&self, last_heartbeat: DateTime<Utc>) -> Self {
        Self {
            last_heartbeat,
            ..self.clone()
        }
    }
}

/// Subsystem a peer proxy bridges to `to` inside `cluster_name`
///
/// The peer parses exactly `proxy:<to>@<cluster>`.
pub fn proxy_subsystem_name(to: &Addr, cluster_name: &str) -> String {
    format!("proxy:{}@{}", to, cluster_name)
}

/// Opens authenticated SSH client connections to peer proxies
#[async_trait]
pub trait TunnelDialer: Send + Sync {
    async fn dial(&self, network: &str, addr: &str) -> Result<Box<dyn TunnelClient>>;
}

/// An established SSH client connection
#[async_trait]
pub trait TunnelClient: Send {
    async fn new_session(&mut self) -> Result<Box<dyn TunnelSession>>;

    /// Tear down the connection
    fn close(self: Box<Self>);
}

/// A session channel on a [`TunnelClient`]
#[async_trait]
pub trait TunnelSession: Send {
    /// Request a subsystem and wait for the peer to accept it
    async fn request_subsystem(&mut self, name: &str) -> Result<()>;

    /// Take the session's stdin/stdout as one duplex stream
    ///
    /// Can be taken once; the session stays owned by the caller.
    fn stdio(&mut self) -> Result<Box<dyn Stream>>;

    /// Close the session
    fn close(self: Box<Self>);
}

/// Session stdio exposed as a stream
///
/// Owns the session and the client connection it runs on. Dropping a
/// `PipeConn` closes the session and then the client, each exactly once;
/// whoever holds the `PipeConn` holds the whole SSH connection.
pub struct PipeConn {
    stdio: Box<dyn Stream>,
    session: Option<Box<dyn TunnelSession>>,
    client: Option<Box<dyn TunnelClient>>,
}

impl PipeConn {
    pub fn new(
        stdio: Box<dyn Stream>,
        session: Box<dyn TunnelSession>,
        client: Box<dyn TunnelClient>,
    ) -> Self {
        Self {
            stdio,
            session: Some(session),
            client: Some(client),
        }
    }
}

impl Drop for PipeConn {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        if let Some(client) = self.client.take() {
            client.close();
        }
    }
}

impl AsyncRead for PipeConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdio).poll_read(cx, buf)
    }
}

impl AsyncWrite for PipeConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stdio).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdio).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdio).poll_shutdown(cx)
    }
}
