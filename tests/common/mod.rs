//! Collaborator doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use revtunnel::auth::{
    AccessPoint, AuthClient, ClientFactory, DialFn, HostCertRequest, ServerInfo,
};
use revtunnel::forward::{Forwarder, ForwarderConfig, ForwarderFactory};
use revtunnel::net::{Addr, Conn, Stream};
use revtunnel::site::{ServerContext, SiteSettings};
use revtunnel::tunnel::{TunnelClient, TunnelDialer, TunnelSession};
use revtunnel::{Error, Result};
use ssh_key::certificate::{Builder, CertType};
use ssh_key::rand_core::OsRng;
use ssh_key::{Algorithm, Certificate, PrivateKey};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::DuplexStream;

/// Auth client signing real host certificates with a throwaway CA
pub struct SigningAuthClient {
    domain: String,
    ca: PrivateKey,
    pub signing_delay: Duration,
    pub signed: AtomicUsize,
}

impl SigningAuthClient {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            ca: PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap(),
            signing_delay: Duration::ZERO,
            signed: AtomicUsize::new(0),
        }
    }

    pub fn with_signing_delay(mut self, delay: Duration) -> Self {
        self.signing_delay = delay;
        self
    }

    pub fn signed(&self) -> usize {
        self.signed.load(Ordering::SeqCst)
    }

    pub fn ca_public_key(&self) -> ssh_key::PublicKey {
        self.ca.public_key().clone()
    }
}

#[async_trait]
impl AuthClient for SigningAuthClient {
    async fn get_domain_name(&self) -> Result<String> {
        Ok(self.domain.clone())
    }

    async fn generate_host_cert(&self, req: HostCertRequest) -> Result<Certificate> {
        self.signed.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.signing_delay).await;

        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        let mut builder = Builder::new_with_random_nonce(
            &mut OsRng,
            req.public_key.key_data().clone(),
            now - 60,
            now + req.ttl.as_secs().max(60),
        )?;
        builder.serial(42)?;
        builder.key_id(req.host_id.clone())?;
        builder.cert_type(CertType::Host)?;
        for principal in &req.principals {
            builder.valid_principal(principal.clone())?;
        }
        Ok(builder.sign(&self.ca)?)
    }

    async fn get_nodes(&self) -> Result<Vec<ServerInfo>> {
        Ok(Vec::new())
    }
}

struct PassThroughAccessPoint(Arc<dyn AuthClient>);

#[async_trait]
impl AccessPoint for PassThroughAccessPoint {
    async fn get_domain_name(&self) -> Result<String> {
        self.0.get_domain_name().await
    }

    async fn get_nodes(&self) -> Result<Vec<ServerInfo>> {
        self.0.get_nodes().await
    }
}

#[derive(Default)]
pub struct RecordingClientFactory {
    pub dial_fns: Mutex<Vec<DialFn>>,
}

impl ClientFactory for RecordingClientFactory {
    fn new_client(&self, _endpoint: &str, dial: DialFn) -> Result<Arc<dyn AuthClient>> {
        self.dial_fns.lock().unwrap().push(dial);
        Ok(Arc::new(SigningAuthClient::new("remote.example.com")))
    }

    fn new_access_point(
        &self,
        client: Arc<dyn AuthClient>,
        _cache_name: &[String],
    ) -> Result<Arc<dyn AccessPoint>> {
        Ok(Arc::new(PassThroughAccessPoint(client)))
    }
}

/// Counters and failure switches of the fake SSH transport
#[derive(Default)]
pub struct TransportState {
    pub dials: AtomicUsize,
    pub fail_connect: AtomicBool,
    pub fail_subsystem: AtomicBool,
    pub client_closes: AtomicUsize,
    pub sessions: AtomicUsize,
    pub session_closes: AtomicUsize,
    pub subsystems: Mutex<Vec<String>>,
    pub far_ends: Mutex<Vec<DuplexStream>>,
}

impl TransportState {
    pub fn client_closes(&self) -> usize {
        self.client_closes.load(Ordering::SeqCst)
    }

    pub fn session_closes(&self) -> usize {
        self.session_closes.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

pub struct FakeTunnelDialer(pub Arc<TransportState>);

#[async_trait]
impl TunnelDialer for FakeTunnelDialer {
    async fn dial(&self, _network: &str, _addr: &str) -> Result<Box<dyn TunnelClient>> {
        self.0.dials.fetch_add(1, Ordering::SeqCst);
        if self.0.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::Other("connection refused".to_string()));
        }
        Ok(Box::new(FakeClient(Arc::clone(&self.0))))
    }
}

struct FakeClient(Arc<TransportState>);

#[async_trait]
impl TunnelClient for FakeClient {
    async fn new_session(&mut self) -> Result<Box<dyn TunnelSession>> {
        self.0.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession(Arc::clone(&self.0))))
    }

    fn close(self: Box<Self>) {
        self.0.client_closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeSession(Arc<TransportState>);

#[async_trait]
impl TunnelSession for FakeSession {
    async fn request_subsystem(&mut self, name: &str) -> Result<()> {
        self.0.subsystems.lock().unwrap().push(name.to_string());
        if self.0.fail_subsystem.load(Ordering::SeqCst) {
            return Err(Error::Other("unknown subsystem".to_string()));
        }
        Ok(())
    }

    fn stdio(&mut self) -> Result<Box<dyn Stream>> {
        let (near, far) = tokio::io::duplex(4096);
        self.0.far_ends.lock().unwrap().push(far);
        Ok(Box::new(near))
    }

    fn close(self: Box<Self>) {
        self.0.session_closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Forwarder factory whose forwarders dial the target directly
#[derive(Default)]
pub struct DirectForwarderFactory {
    pub built: AtomicUsize,
    pub sources: Mutex<Vec<String>>,
}

impl ForwarderFactory for DirectForwarderFactory {
    fn new_forwarder(&self, config: ForwarderConfig) -> Result<Box<dyn Forwarder>> {
        self.built.fetch_add(1, Ordering::SeqCst);
        self.sources.lock().unwrap().push(config.source.clone());
        Ok(Box::new(DirectForwarder(config)))
    }
}

struct DirectForwarder(ForwarderConfig);

#[async_trait]
impl Forwarder for DirectForwarder {
    async fn dial(&self, target: &str) -> Result<Conn> {
        revtunnel::net::dial_direct(&Addr::tcp(self.0.source.as_str()), &Addr::tcp(target)).await
    }
}

pub struct Fixture {
    pub ctx: ServerContext,
    pub transport: Arc<TransportState>,
    pub clients: Arc<RecordingClientFactory>,
    pub forwarders: Arc<DirectForwarderFactory>,
}

impl Fixture {
    pub fn new(settings: SiteSettings) -> Self {
        let transport = Arc::new(TransportState::default());
        let clients = Arc::new(RecordingClientFactory::default());
        let forwarders = Arc::new(DirectForwarderFactory::default());
        let ctx = ServerContext::new(
            settings,
            Arc::new(FakeTunnelDialer(Arc::clone(&transport))),
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
