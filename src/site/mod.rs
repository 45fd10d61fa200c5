//! Remote sites: the clusters a proxy can route connections into
//!
//! Every site implements [`RemoteSite`]:
//! - [`LocalSite`]: the proxy's own cluster, dialed directly or through a
//!   recording forwarder
//! - [`ClusterPeer`]: one proxy replica of a remote cluster, reached through
//!   its tunnel
//! - [`ClusterPeers`]: all replicas of a remote cluster, delegating to the
//!   one with the freshest heartbeat

mod hostcert;
mod local;
mod peer;
mod peers;

#[cfg(test)]
pub(crate) mod testing;

pub use hostcert::{HostCertificate, HostCertificateCache};
pub use local::{LocalSite, find_server};
pub use peer::{ClusterPeer, PeerDialer};
pub use peers::ClusterPeers;

use crate::auth::{AccessPoint, AuthClient, ClientFactory};
use crate::error::Result;
use crate::forward::ForwarderFactory;
use crate::net::{Addr, Conn};
use crate::tunnel::TunnelDialer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default time without heartbeat after which a peer is offline
pub const DEFAULT_OFFLINE_THRESHOLD: Duration = Duration::from_secs(25);

/// Default deadline for connecting to a peer proxy
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default lifetime of a cached host certificate
pub const DEFAULT_HOST_CERT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default number of host certificates kept in the cache
pub const DEFAULT_HOST_CERT_CAPACITY: usize = 4000;

/// Reachability of a site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteStatus {
    Online,
    Offline,
}

impl SiteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteStatus::Online => "online",
            SiteStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cluster the proxy can route connections into
#[async_trait]
pub trait RemoteSite: Send + Sync {
    /// Caching access point of the site's cluster
    fn caching_access_point(&self) -> Result<Arc<dyn AccessPoint>>;

    /// API client of the site's cluster
    fn get_client(&self) -> Result<Arc<dyn AuthClient>>;

    /// Whether the site is reachable; never fails
    fn get_status(&self) -> SiteStatus;

    /// Cluster name
    fn get_name(&self) -> String;

    /// When the site was last known to be connected
    fn get_last_connected(&self) -> DateTime<Utc>;

    /// Connect to `to` inside the site on behalf of `from`
    async fn dial(&self, from: &Addr, to: &Addr) -> Result<Conn>;
}

/// Policy knobs shared by all sites of a proxy process
#[derive(Debug, Clone)]
pub struct SiteSettings {
    /// Route local dials through the recording forwarder
    pub recording_proxy_enabled: bool,
    /// Time without heartbeat after which a peer is offline
    pub offline_threshold: Duration,
    /// Deadline for connecting to a peer proxy
    pub dial_timeout: Duration,
    pub host_cert_ttl: Duration,
    pub host_cert_capacity: usize,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            recording_proxy_enabled: true,
            offline_threshold: DEFAULT_OFFLINE_THRESHOLD,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            host_cert_ttl: DEFAULT_HOST_CERT_TTL,
            host_cert_capacity: DEFAULT_HOST_CERT_CAPACITY,
        }
    }
}

/// Collaborators and settings of the proxy that owns the sites
#[derive(Clone)]
pub struct ServerContext {
    pub settings: SiteSettings,
    /// Transport to peer proxies
    pub tunnel_dialer: Arc<dyn TunnelDialer>,
    /// Builds API clients and access points
    pub client_factory: Arc<dyn ClientFactory>,
    /// Builds recording forwarders for the local site
    pub forwarder_factory: Arc<dyn ForwarderFactory>,
}

impl ServerContext {
    pub fn new(
        settings: SiteSettings,
        tunnel_dialer: Arc<dyn TunnelDialer>,
        client_factory: Arc<dyn ClientFactory>,
        forwarder_factory: Arc<dyn ForwarderFactory>,
    ) -> Self {
        Self {
            settings,
            tunnel_dialer,
            client_factory,
            forwarder_factory,
        }
    }

    /// Access point cache name for a cluster reached over a tunnel
    pub(crate) fn access_point_cache_name(cluster_name: &str) -> Vec<String> {
        vec!["reverse".to_string(), cluster_name.to_string()]
    }
}
