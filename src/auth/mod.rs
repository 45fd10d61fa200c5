//! Access-control collaborator contracts
//!
//! The auth API client and its caching access point live outside this
//! crate. Sites only hold them and hand them to callers; the host
//! certificate cache additionally asks the client to sign host keys.

use crate::error::Result;
use crate::net::{Addr, Conn};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Endpoint used for API clients whose transport is a tunnel dial
///
/// The host part is never resolved; every request goes through the
/// client's dial function.
pub const TUNNELED_API_ENDPOINT: &str = "http://stub:0";

/// Transport for API clients: dial `to` on behalf of `from`
pub type DialFn = Arc<dyn Fn(Addr, Addr) -> BoxFuture<'static, Result<Conn>> + Send + Sync>;

/// A node registered in a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Node host name
    pub hostname: String,
    /// Address the node listens on (`host:port`)
    pub addr: String,
}

/// Request to sign a host key
#[derive(Debug, Clone)]
pub struct HostCertRequest {
    /// Public key to certify
    pub public_key: ssh_key::PublicKey,
    /// Host identifier recorded in the certificate
    pub host_id: String,
    /// Node name recorded in the certificate
    pub node_name: String,
    /// Principals the certificate is valid for
    pub principals: Vec<String>,
    /// Cluster whose host CA signs the certificate
    pub cluster_name: String,
    /// Requested validity
    pub ttl: Duration,
}

/// Client of the access-control API
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// Name of the cluster the client talks to
    async fn get_domain_name(&self) -> Result<String>;

    /// Sign a host key with the cluster's host CA
    async fn generate_host_cert(&self, req: HostCertRequest) -> Result<ssh_key::Certificate>;

    /// Nodes registered in the cluster
    async fn get_nodes(&self) -> Result<Vec<ServerInfo>>;
}

/// Caching read path built on top of an [`AuthClient`]
#[async_trait]
pub trait AccessPoint: Send + Sync {
    async fn get_domain_name(&self) -> Result<String>;

    async fn get_nodes(&self) -> Result<Vec<ServerInfo>>;
}

/// Builds API clients and access points
pub trait ClientFactory: Send + Sync {
    /// Create an API client for `endpoint` whose connections are made by `dial`
    fn new_client(&self, endpoint: &str, dial: DialFn) -> Result<Arc<dyn AuthClient>>;

    /// Create a caching access point over `client`, keyed by `cache_name`
    fn new_access_point(
        &self,
        client: Arc<dyn AuthClient>,
        cache_name: &[String],
    ) -> Result<Arc<dyn AccessPoint>>;
}
