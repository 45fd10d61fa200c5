//! All proxy replicas of a remote cluster

use crate::auth::{AccessPoint, AuthClient};
use crate::error::{Error, Result};
use crate::net::{Addr, Conn};
use crate::site::{ClusterPeer, RemoteSite, SiteStatus};
use crate::tunnel::TunnelConnection;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// The peers of one remote cluster, keyed by tunnel connection name
///
/// Every [`RemoteSite`] call picks the peer with the freshest heartbeat
/// anew, so consecutive calls may land on different replicas.
pub struct ClusterPeers {
    cluster_name: String,
    peers: RwLock<HashMap<String, Arc<ClusterPeer>>>,
}

impl ClusterPeers {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            peers: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<ClusterPeer>>> {
        self.peers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<ClusterPeer>>> {
        self.peers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a peer, replacing any peer with the same connection name
    pub fn add_peer(&self, peer: Arc<ClusterPeer>) {
        let name = peer.conn_info().name().to_string();
        debug!(cluster = %self.cluster_name, conn = %name, "Adding peer");
        self.write().insert(name, peer);
    }

    /// Replace the descriptor of the peer registered under `conn`'s name
    ///
    /// Returns false, changing nothing, when no such peer exists.
    pub fn update_peer(&self, conn: Arc<TunnelConnection>) -> bool {
        let peers = self.read();
        match peers.get(conn.name()) {
            Some(peer) => {
                debug!(cluster = %self.cluster_name, conn = %conn.name(), heartbeat = %conn.last_heartbeat(), "Updating peer");
                peer.set_conn_info(conn);
                true
            }
            None => false,
        }
    }

    /// Remove the peer registered under `name`, if any
    pub fn remove_peer(&self, name: &str) {
        if self.write().remove(name).is_some() {
            debug!(cluster = %self.cluster_name, conn = %name, "Removed peer");
        }
    }

    /// Peer with the most recent heartbeat
    pub fn pick_peer(&self) -> Result<Arc<ClusterPeer>> {
        let peers = self.read();
        let mut best: Option<(&Arc<ClusterPeer>, DateTime<Utc>)> = None;
        for peer in peers.values() {
            let heartbeat = peer.conn_info().last_heartbeat();
            if best.is_none_or(|(_, newest)| heartbeat > newest) {
                best = Some((peer, heartbeat));
            }
        }
        best.map(|(peer, _)| Arc::clone(peer))
            .ok_or_else(|| Error::NotFound(format!("no active peers for {}", self.cluster_name)))
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Connection names of all registered peers, sorted
    pub fn peer_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Display for ClusterPeers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clusterPeers({})", self.cluster_name)
    }
}

#[async_trait]
impl RemoteSite for ClusterPeers {
    fn caching_access_point(&self) -> Result<Arc<dyn AccessPoint>> {
        self.pick_peer()?.caching_access_point()
    }

    fn get_client(&self) -> Result<Arc<dyn AuthClient>> {
        self.pick_peer()?.get_client()
    }

    fn get_status(&self) -> SiteStatus {
        match self.pick_peer() {
            Ok(peer) => peer.get_status(),
            Err(_) => SiteStatus::Offline,
        }
    }

    fn get_name(&self) -> String {
        self.cluster_name.clone()
    }

    fn get_last_connected(&self) -> DateTime<Utc> {
        match self.pick_peer() {
            Ok(peer) => peer.get_last_connected(),
            Err(_) => DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    async fn dial(&self, from: &Addr, to: &Addr) -> Result<Conn> {
        let peer = self.pick_peer()?;
        peer.dial(from, to).await
    }
}
