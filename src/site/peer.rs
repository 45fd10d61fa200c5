//! One proxy replica of a remote cluster

use crate::auth::{AccessPoint, AuthClient, DialFn, TUNNELED_API_ENDPOINT};
use crate::error::{Error, Result};
use crate::net::{Addr, Conn};
use crate::site::{RemoteSite, ServerContext, SiteStatus};
use crate::tunnel::{PipeConn, TunnelConnection, TunnelDialer, proxy_subsystem_name};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use scopeguard::ScopeGuard;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};

type SharedConnInfo = Arc<RwLock<Arc<TunnelConnection>>>;

/// Dials targets through a peer proxy's `proxy` subsystem
///
/// Holds only the peer's connection descriptor and transport, not the peer
/// itself, so it can serve as the transport of the peer's own API client.
#[derive(Clone)]
pub struct PeerDialer {
    conn_info: SharedConnInfo,
    tunnel_dialer: Arc<dyn TunnelDialer>,
    dial_timeout: Duration,
}

impl PeerDialer {
    pub fn new(
        conn_info: Arc<TunnelConnection>,
        tunnel_dialer: Arc<dyn TunnelDialer>,
        dial_timeout: Duration,
    ) -> Self {
        Self {
            conn_info: Arc::new(RwLock::new(conn_info)),
            tunnel_dialer,
            dial_timeout,
        }
    }

    /// Current connection descriptor
    pub fn conn_info(&self) -> Arc<TunnelConnection> {
        Arc::clone(&self.conn_info.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn set_conn_info(&self, conn_info: Arc<TunnelConnection>) {
        *self.conn_info.write().unwrap_or_else(PoisonError::into_inner) = conn_info;
    }

    /// Connect to `to` inside the peer's cluster
    ///
    /// The returned connection owns the SSH session and client connection;
    /// dropping it closes both. On any failure both are closed before
    /// returning.
    pub async fn dial(&self, from: &Addr, to: &Addr) -> Result<Conn> {
        let conn_info = self.conn_info();
        let proxy_addr = conn_info.proxy_addr();
        info!(to = %to, peer = %proxy_addr, cluster = %conn_info.cluster_name(), "Forwarding dial through peer proxy");

        let client = tokio::time::timeout(
            self.dial_timeout,
            self.tunnel_dialer.dial(to.network(), proxy_addr),
        )
        .await
        .map_err(|_| {
            Error::Timeout(format!(
                "connect to peer proxy {} exceeded {:?}",
                proxy_addr, self.dial_timeout
            ))
        })?
        .map_err(|e| Error::connection("connect", proxy_addr, e))?;
        let mut client = scopeguard::guard(client, |client| client.close());

        let session = client
            .new_session()
            .await
            .map_err(|e| Error::connection("open session", proxy_addr, e))?;
        let mut session = scopeguard::guard(session, |session| session.close());

        let subsystem = proxy_subsystem_name(to, conn_info.cluster_name());
        session
            .request_subsystem(&subsystem)
            .await
            .map_err(|e| Error::connection("request subsystem", proxy_addr, e))?;
        let stdio = session
            .stdio()
            .map_err(|e| Error::connection("open session pipes", proxy_addr, e))?;

        debug!(subsystem = %subsystem, peer = %proxy_addr, "Peer proxy accepted subsystem");
        let pipe = PipeConn::new(
            stdio,
            ScopeGuard::into_inner(session),
            ScopeGuard::into_inner(client),
        );
        Ok(Conn::new(Box::new(pipe), from.clone(), to.clone()))
    }

    /// Dial function for API clients tunneled through this peer
    pub fn dial_fn(&self) -> DialFn {
        let dialer = self.clone();
        Arc::new(move |from: Addr, to: Addr| {
            let dialer = dialer.clone();
            async move { dialer.dial(&from, &to).await }.boxed()
        })
    }
}

/// A remote cluster's proxy replica reached through one tunnel connection
pub struct ClusterPeer {
    dialer: PeerDialer,
    offline_threshold: Duration,
    client: Arc<dyn AuthClient>,
    access_point: Arc<dyn AccessPoint>,
}

impl ClusterPeer {
    /// Build the peer and its API client, whose transport is the peer's own dial
    pub fn new(ctx: &ServerContext, conn_info: Arc<TunnelConnection>) -> Result<Self> {
        let cache_name = ServerContext::access_point_cache_name(conn_info.cluster_name());
        let dialer = PeerDialer::new(
            conn_info,
            Arc::clone(&ctx.tunnel_dialer),
            ctx.settings.dial_timeout,
        );

        let client = ctx
            .client_factory
            .new_client(TUNNELED_API_ENDPOINT, dialer.dial_fn())?;
        let access_point = ctx
            .client_factory
            .new_access_point(Arc::clone(&client), &cache_name)?;

        Ok(Self {
            dialer,
            offline_threshold: ctx.settings.offline_threshold,
            client,
            access_point,
        })
    }

    pub fn conn_info(&self) -> Arc<TunnelConnection> {
        self.dialer.conn_info()
    }

    /// Replace the connection descriptor wholesale
    pub fn set_conn_info(&self, conn_info: Arc<TunnelConnection>) {
        self.dialer.set_conn_info(conn_info);
    }

    /// Status as of `now`: offline once the heartbeat is older than the threshold
    pub fn status_at(&self, now: DateTime<Utc>) -> SiteStatus {
        let since = now - self.conn_info().last_heartbeat();
        let threshold =
            chrono::Duration::from_std(self.offline_threshold).unwrap_or(chrono::Duration::MAX);
        if since > threshold {
            SiteStatus::Offline
        } else {
            SiteStatus::Online
        }
    }
}

impl fmt::Display for ClusterPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clusterPeer({})", self.conn_info().name())
    }
}

impl fmt::Debug for ClusterPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let conn_info = self.conn_info();
        f.debug_struct("ClusterPeer")
            .field("name", &conn_info.name())
            .field("cluster", &conn_info.cluster_name())
            .field("proxy_addr", &conn_info.proxy_addr())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RemoteSite for ClusterPeer {
    fn caching_access_point(&self) -> Result<Arc<dyn AccessPoint>> {
        Ok(Arc::clone(&self.access_point))
    }

    fn get_client(&self) -> Result<Arc<dyn AuthClient>> {
        Ok(Arc::clone(&self.client))
    }

    fn get_status(&self) -> SiteStatus {
        self.status_at(Utc::now())
    }

    fn get_name(&self) -> String {
        self.conn_info().cluster_name().to_string()
    }

    fn get_last_connected(&self) -> DateTime<Utc> {
        self.conn_info().last_heartbeat()
    }

    async fn dial(&self, from: &Addr, to: &Addr) -> Result<Conn> {
        self.dialer.dial(from, to).await
    }
}
