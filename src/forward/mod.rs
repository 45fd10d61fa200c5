//! In-memory forwarding server contract
//!
//! In recording mode the local site does not hand out raw connections.
//! Instead it builds a forwarding SSH server for every dial; the server
//! terminates the client's SSH session in memory, records it, and opens its
//! own session to the target using the forwarded agent and a host
//! certificate for the target address. Only the construction and dial
//! contract lives here.

use crate::agent::Agent;
use crate::auth::AuthClient;
use crate::error::Result;
use crate::net::Conn;
use crate::site::HostCertificate;
use async_trait::async_trait;
use std::sync::Arc;

/// Everything a forwarding server needs for one dial
#[derive(Clone)]
pub struct ForwarderConfig {
    /// API client used for auditing and access checks
    pub auth_client: Arc<dyn AuthClient>,
    /// Agent forwarded by the user, if any
    pub agent: Option<Arc<dyn Agent>>,
    /// Address the dial originated from
    pub source: String,
    /// Host certificate presented to the client for the target
    pub host_certificate: Arc<HostCertificate>,
}

/// A forwarding server scoped to a single dial
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Connect to `target`, returning the client side of the in-memory server
    async fn dial(&self, target: &str) -> Result<Conn>;
}

/// Constructs forwarding servers
pub trait ForwarderFactory: Send + Sync {
    fn new_forwarder(&self, config: ForwarderConfig) -> Result<Box<dyn Forwarder>>;
}
