//! The proxy's own cluster

use crate::agent::Agent;
use crate::auth::{AccessPoint, AuthClient, ServerInfo};
use crate::error::{Error, Result};
use crate::forward::ForwarderConfig;
use crate::net::{self, Addr, Conn, split_host_port};
use crate::site::{HostCertificateCache, RemoteSite, ServerContext, SiteStatus};
use crate::tunnel::TunnelConnection;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Mutable state of a [`LocalSite`], guarded by a single lock
struct LocalState {
    connections: Vec<Arc<TunnelConnection>>,
    last_used: usize,
    last_active: DateTime<Utc>,
    agent: Option<Arc<dyn Agent>>,
    cert_cache: HostCertificateCache,
}

/// The cluster the proxy itself belongs to
///
/// Always online. Dials either go straight to the target or, in recording
/// mode, through a forwarding server built for that single dial.
pub struct LocalSite {
    ctx: ServerContext,
    domain_name: String,
    client: Arc<dyn AuthClient>,
    access_point: Arc<dyn AccessPoint>,
    state: Mutex<LocalState>,
}

impl LocalSite {
    pub fn new(
        ctx: ServerContext,
        domain_name: impl Into<String>,
        client: Arc<dyn AuthClient>,
    ) -> Result<Self> {
        let domain_name = domain_name.into();
        let access_point = ctx.client_factory.new_access_point(
            Arc::clone(&client),
            &ServerContext::access_point_cache_name(&domain_name),
        )?;
        let cert_cache = HostCertificateCache::new(
            Arc::clone(&client),
            ctx.settings.host_cert_ttl,
            ctx.settings.host_cert_capacity,
        );

        Ok(Self {
            ctx,
            domain_name,
            client,
            access_point,
            state: Mutex::new(LocalState {
                connections: Vec::new(),
                last_used: 0,
                last_active: Utc::now(),
                agent: None,
                cert_cache,
            }),
        })
    }

    /// Replace the agent handed to recording forwarders
    ///
    /// The agent owns its channel, so the previous agent's channel is
    /// released once no in-flight dial holds it any more.
    pub async fn set_agent(&self, agent: Arc<dyn Agent>) {
        let mut state = self.state.lock().await;
        debug!(cluster = %self.domain_name, replaced = state.agent.is_some(), "Forwarding agent set");
        state.agent = Some(agent);
    }

    pub async fn add_connection(&self, conn: Arc<TunnelConnection>) {
        let mut state = self.state.lock().await;
        debug!(cluster = %self.domain_name, conn = %conn.name(), "Local tunnel connection added");
        state.connections.push(conn);
        state.last_active = Utc::now();
    }

    /// Drop the connection named `name`; returns whether it was present
    pub async fn remove_connection(&self, name: &str) -> bool {
        let mut state = self.state.lock().await;
        let before = state.connections.len();
        state.connections.retain(|c| c.name() != name);
        let removed = state.connections.len() != before;
        if removed {
            debug!(cluster = %self.domain_name, conn = %name, "Local tunnel connection removed");
        }
        removed
    }

    /// Next connection in round-robin order
    pub async fn next_connection(&self) -> Result<Arc<TunnelConnection>> {
        let mut state = self.state.lock().await;
        if state.connections.is_empty() {
            return Err(Error::NotFound(format!(
                "no tunnel connections to {}",
                self.domain_name
            )));
        }
        state.last_used = (state.last_used + 1) % state.connections.len();
        state.last_active = Utc::now();
        Ok(Arc::clone(&state.connections[state.last_used]))
    }

    pub async fn last_active(&self) -> DateTime<Utc> {
        self.state.lock().await.last_active
    }

    /// Look up the registered node behind `addr`
    pub async fn resolve_server(&self, addr: &str) -> Result<ServerInfo> {
        let servers = self.access_point.get_nodes().await?;
        find_server(addr, &servers)
    }
}

impl fmt::Display for LocalSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "localSite({})", self.domain_name)
    }
}

#[async_trait]
impl RemoteSite for LocalSite {
    fn caching_access_point(&self) -> Result<Arc<dyn AccessPoint>> {
        Ok(Arc::clone(&self.access_point))
    }

    fn get_client(&self) -> Result<Arc<dyn AuthClient>> {
        Ok(Arc::clone(&self.client))
    }

    fn get_status(&self) -> SiteStatus {
        SiteStatus::Online
    }

    fn get_name(&self) -> String {
        self.domain_name.clone()
    }

    fn get_last_connected(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn dial(&self, from: &Addr, to: &Addr) -> Result<Conn> {
        let state = self.state.lock().await;
        debug!(cluster = %self.domain_name, from = %from, to = %to, "Dialing local site");

        if !self.ctx.settings.recording_proxy_enabled {
            return net::dial_direct(from, to).await;
        }

        let host_certificate = state.cert_cache.get(to.address()).await?;
        let forwarder = self
            .ctx
            .forwarder_factory
            .new_forwarder(ForwarderConfig {
                auth_client: Arc::clone(&self.client),
                agent: state.agent.clone(),
                source: from.to_string(),
                host_certificate,
            })
            .map_err(|e| {
                Error::Forwarder(format!("failed to create forwarding server for {}: {}", to, e))
            })?;

        forwarder
            .dial(to.address())
            .await
            .map_err(|e| Error::Forwarder(format!("forwarding dial to {} failed: {}", to, e)))
    }
}

/// Find the server registered under `addr`
///
/// A server matches when `addr` is its `hostname:port` (port taken from its
/// own address) or its literal address.
pub fn find_server(addr: &str, servers: &[ServerInfo]) -> Result<ServerInfo> {
    for server in servers {
        let port = match split_host_port(&server.addr) {
            Ok((_, port)) => port,
            Err(e) => {
                warn!(server = %server.hostname, addr = %server.addr, error = %e, "Server has incorrect address format");
                continue;
            }
        };
        if server.hostname.is_empty() || port.is_empty() {
            continue;
        }
        if addr == format!("{}:{}", server.hostname, port) || addr == server.addr {
            return Ok(server.clone());
        }
    }
    Err(Error::NotFound(format!("server {} is unknown", addr)))
}
