//! Test doubles for site collaborators

use crate::auth::{AccessPoint, AuthClient, ClientFactory, DialFn, HostCertRequest, ServerInfo};
use crate::error::{Error, Result};
use crate::forward::{Forwarder, ForwarderConfig, ForwarderFactory};
use crate::net::{Addr, Conn, Stream};
use crate::site::{ServerContext, SiteSettings};
use crate::tunnel::{TunnelClient, TunnelDialer, TunnelSession};
use async_trait::async_trait;
use ssh_key::certificate::{Builder, CertType};
use ssh_key::rand_core::OsRng;
use ssh_key::{Algorithm, Certificate, PrivateKey};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::DuplexStream;

pub(crate) struct MockAuthClient {
    domain: String,
    ca: PrivateKey,
    nodes: Mutex<Vec<ServerInfo>>,
    requests: AtomicUsize,
    last_request: Mutex<Option<HostCertRequest>>,
    fail: AtomicBool,
}

impl MockAuthClient {
    pub(crate) fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            ca: PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap(),
            nodes: Mutex::new(Vec::new()),
            requests: AtomicUsize::new(0),
            last_request: Mutex::new(None),
            fail: AtomicBool::new(false),
        }
    }

    pub(crate) fn host_cert_requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub(crate) fn last_host_cert_request(&self) -> Option<HostCertRequest> {
        self.last_request.lock().unwrap().clone()
    }

    pub(crate) fn fail_signing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_nodes(&self, nodes: Vec<ServerInfo>) {
        *self.nodes.lock().unwrap() = nodes;
    }
}

pub(crate) fn sign_host_cert(ca: &PrivateKey, req: &HostCertRequest) -> Result<Certificate> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    let mut builder = Builder::new_with_random_nonce(
        &mut OsRng,
        req.public_key.key_data().clone(),
        now - 60,
        now + 3600,
    )?;
    builder.serial(1)?;
    builder.key_id(req.host_id.clone())?;
    builder.cert_type(CertType::Host)?;
    for principal in &req.principals {
        builder.valid_principal(principal.clone())?;
    }
    Ok(builder.sign(ca)?)
}

#[async_trait]
impl AuthClient for MockAuthClient {
    async fn get_domain_name(&self) -> Result<String> {
        Ok(self.domain.clone())
    }

    async fn generate_host_cert(&self, req: HostCertRequest) -> Result<Certificate> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(req.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Other("signing disabled".to_string()));
        }
        sign_host_cert(&self.ca, &req)
    }

    async fn get_nodes(&self) -> Result<Vec<ServerInfo>> {
        Ok(self.nodes.lock().unwrap().clone())
    }
}

pub(crate) struct MockAccessPoint {
    client: Arc<dyn AuthClient>,
}

#[async_trait]
impl AccessPoint for MockAccessPoint {
    async fn get_domain_name(&self) -> Result<String> {
        self.client.get_domain_name().await
    }

    async fn get_nodes(&self) -> Result<Vec<ServerInfo>> {
        self.client.get_nodes().await
    }
}

/// Builds `MockAuthClient`s and remembers what it was asked for
#[derive(Default)]
pub(crate) struct MockClientFactory {
    pub(crate) endpoints: Mutex<Vec<String>>,
    pub(crate) cache_names: Mutex<Vec<Vec<String>>>,
    pub(crate) dial_fns: Mutex<Vec<DialFn>>,
}

impl ClientFactory for MockClientFactory {
    fn new_client(&self, endpoint: &str, dial: DialFn) -> Result<Arc<dyn AuthClient>> {
        self.endpoints.lock().unwrap().push(endpoint.to_string());
        self.dial_fns.lock().unwrap().push(dial);
        Ok(Arc::new(MockAuthClient::new("remote.example.com")))
    }

    fn new_access_point(
        &self,
        client: Arc<dyn AuthClient>,
        cache_name: &[String],
    ) -> Result<Arc<dyn AccessPoint>> {
        self.cache_names.lock().unwrap().push(cache_name.to_vec());
        Ok(Arc::new(MockAccessPoint { client }))
    }
}

/// Where a mock tunnel dial should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailAt {
    /// Connect never completes
    Hang,
    Connect,
    Session,
    Subsystem,
    Stdio,
}

/// Shared counters of the mock tunnel transport
#[derive(Default)]
pub(crate) struct TunnelState {
    pub(crate) dialed: Mutex<Vec<String>>,
    pub(crate) client_closes: AtomicUsize,
    pub(crate) sessions: AtomicUsize,
    pub(crate) session_closes: AtomicUsize,
    pub(crate) subsystems: Mutex<Vec<String>>,
    pub(crate) fail_at: Mutex<Option<FailAt>>,
    pub(crate) remote_ends: Mutex<Vec<DuplexStream>>,
}

impl TunnelState {
    pub(crate) fn fail_at(&self, step: Option<FailAt>) {
        *self.fail_at.lock().unwrap() = step;
    }

    fn fails_at(&self, step: FailAt) -> bool {
        *self.fail_at.lock().unwrap() == Some(step)
    }
}

pub(crate) struct MockTunnelDialer {
    pub(crate) transport: Arc<TunnelState>,
}

#[async_trait]
impl TunnelDialer for MockTunnelDialer {
    async fn dial(&self, _network: &str, addr: &str) -> Result<Box<dyn TunnelClient>> {
        self.transport.dialed.lock().unwrap().push(addr.to_string());
        if self.transport.fails_at(FailAt::Hang) {
            std::future::pending::<()>().await;
        }
        if self.transport.fails_at(FailAt::Connect) {
            return Err(Error::Other("connection refused".to_string()));
        }
        Ok(Box::new(MockTunnelClient {
            transport: Arc::clone(&self.transport),
        }))
    }
}

struct MockTunnelClient {
    transport: Arc<TunnelState>,
}

#[async_trait]
impl TunnelClient for MockTunnelClient {
    async fn new_session(&mut self) -> Result<Box<dyn TunnelSession>> {
        if self.transport.fails_at(FailAt::Session) {
            return Err(Error::Other("administratively prohibited".to_string()));
        }
        self.transport.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockTunnelSession {
            transport: Arc::clone(&self.transport),
        }))
    }

    fn close(self: Box<Self>) {
        self.transport.client_closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockTunnelSession {
    transport: Arc<TunnelState>,
}

#[async_trait]
impl TunnelSession for MockTunnelSession {
    async fn request_subsystem(&mut self, name: &str) -> Result<()> {
        self.transport.subsystems.lock().unwrap().push(name.to_string());
        if self.transport.fails_at(FailAt::Subsystem) {
            return Err(Error::Other("subsystem request failed".to_string()));
        }
        Ok(())
    }

    fn stdio(&mut self) -> Result<Box<dyn Stream>> {
        if self.transport.fails_at(FailAt::Stdio) {
            return Err(Error::Other("pipe unavailable".to_string()));
        }
        let (local, remote) = tokio::io::duplex(1024);
        self.transport.remote_ends.lock().unwrap().push(remote);
        Ok(Box::new(local))
    }

    fn close(self: Box<Self>) {
        self.transport.session_closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Forwarder factory recording every forwarder it builds
#[derive(Default)]
pub(crate) struct MockForwarderFactory {
    pub(crate) configs: Mutex<Vec<ForwarderConfig>>,
    pub(crate) dialed: Arc<Mutex<Vec<String>>>,
    pub(crate) fail_dial: AtomicBool,
}

impl ForwarderFactory for MockForwarderFactory {
    fn new_forwarder(&self, config: ForwarderConfig) -> Result<Box<dyn Forwarder>> {
        let source = config.source.clone();
        self.configs.lock().unwrap().push(config);
        Ok(Box::new(MockForwarder {
            source,
            dialed: Arc::clone(&self.dialed),
            fail: self.fail_dial.load(Ordering::SeqCst),
        }))
    }
}

struct MockForwarder {
    source: String,
    dialed: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

#[async_trait]
impl Forwarder for MockForwarder {
    async fn dial(&self, target: &str) -> Result<Conn> {
        self.dialed.lock().unwrap().push(target.to_string());
        if self.fail {
            return Err(Error::Other("forwarder dial failed".to_string()));
        }
        let (local, _remote) = tokio::io::duplex(64);
        Ok(Conn::new(
            Box::new(local),
            Addr::tcp(self.source.clone()),
            Addr::tcp(target),
        ))
    }
}

/// Mocks wired into a `ServerContext`
pub(crate) struct Harness {
    pub(crate) ctx: ServerContext,
    pub(crate) transport: Arc<TunnelState>,
    pub(crate) clients: Arc<MockClientFactory>,
    pub(crate) forwarders: Arc<MockForwarderFactory>,
}

impl Harness {
    pub(crate) fn new(settings: SiteSettings) -> Self {
        let transport = Arc::new(TunnelState::default());
        let clients = Arc::new(MockClientFactory::default());
        let forwarders = Arc::new(MockForwarderFactory::default());
        let ctx = ServerContext::new(
            settings,
            Arc::new(MockTunnelDialer {
                transport: Arc::clone(&transport),
            }),
            clients.clone(),
            forwarders.clone(),
        );
        Self {
            ctx,
            transport,
            clients,
            forwarders,
        }
    }
}
