//! SSH transport to peer proxies using russh

use crate::error::{Error, Result};
use crate::net::Stream;
use crate::tunnel::{TunnelClient, TunnelDialer, TunnelSession};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use russh::client::{self, Handle, Msg};
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::{PrivateKey, PublicKey, PublicKeyBase64};
use russh::{Channel, ChannelMsg, Disconnect};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Settings for [`SshTunnelDialer`]
#[derive(Debug, Clone)]
pub struct SshTunnelConfig {
    /// User the proxy authenticates as on peer proxies
    pub user: String,
    /// Private key used for authentication
    pub identity_file: PathBuf,
    /// Host keys of peer proxies, in authorized_keys format
    pub trusted_host_keys: Vec<String>,
    /// Accept any host key (testing only)
    pub insecure_accept_any_host_key: bool,
}

/// Dials peer proxies over SSH
pub struct SshTunnelDialer {
    user: String,
    key: Arc<PrivateKey>,
    trusted_host_keys: Arc<HashSet<String>>,
    insecure_accept_any_host_key: bool,
    ssh_config: Arc<client::Config>,
}

impl SshTunnelDialer {
    /// Load the identity file and trusted host keys
    pub fn new(config: &SshTunnelConfig) -> Result<Self> {
        let key = russh::keys::load_secret_key(&config.identity_file, None).map_err(|e| {
            Error::Config(format!(
                "Failed to load identity file {}: {}",
                config.identity_file.display(),
                e
            ))
        })?;

        let trusted_host_keys = config
            .trusted_host_keys
            .iter()
            .map(|line| key_blob_base64(line))
            .collect::<Result<HashSet<_>>>()?;

        if trusted_host_keys.is_empty() && !config.insecure_accept_any_host_key {
            warn!("No trusted host keys configured; every peer proxy will be rejected");
        }

        let ssh_config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        };

        Ok(Self {
            user: config.user.clone(),
            key: Arc::new(key),
            trusted_host_keys: Arc::new(trusted_host_keys),
            insecure_accept_any_host_key: config.insecure_accept_any_host_key,
            ssh_config: Arc::new(ssh_config),
        })
    }
}

/// Base64 key blob of an authorized_keys line, as sent on the wire
fn key_blob_base64(line: &str) -> Result<String> {
    let key = ssh_key::PublicKey::from_openssh(line.trim())?;
    Ok(BASE64.encode(key.to_bytes()?))
}

#[async_trait]
impl TunnelDialer for SshTunnelDialer {
    async fn dial(&self, network: &str, addr: &str) -> Result<Box<dyn TunnelClient>> {
        if !network.starts_with("tcp") {
            return Err(Error::Connection(format!(
                "Peer proxies are reachable over tcp only, got '{}'",
                network
            )));
        }

        let handler = PeerHostKeyCheck {
            addr: addr.to_string(),
            trusted_host_keys: Arc::clone(&self.trusted_host_keys),
            insecure_accept_any_host_key: self.insecure_accept_any_host_key,
        };

        let mut handle = client::connect(Arc::clone(&self.ssh_config), addr, handler).await?;
        debug!(peer = %addr, "SSH handshake with peer proxy completed");

        let auth = handle
            .authenticate_publickey(
                self.user.clone(),
                PrivateKeyWithHashAlg::new(Arc::clone(&self.key), None),
            )
            .await?;
        if !auth.success() {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "authentication failed", "en")
                .await;
            return Err(Error::Connection(format!(
                "Peer proxy {} rejected authentication as {}",
                addr, self.user
            )));
        }

        info!(peer = %addr, user = %self.user, "Authenticated to peer proxy");
        Ok(Box::new(SshTunnelClient { handle }))
    }
}

/// Verifies peer proxy host keys against the trusted set
struct PeerHostKeyCheck {
    addr: String,
    trusted_host_keys: Arc<HashSet<String>>,
    insecure_accept_any_host_key: bool,
}

impl client::Handler for PeerHostKeyCheck {
    type Error = Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool> {
        if self
            .trusted_host_keys
            .contains(&server_public_key.public_key_base64())
        {
            return Ok(true);
        }
        if self.insecure_accept_any_host_key {
            warn!(peer = %self.addr, "Accepting untrusted peer host key");
            return Ok(true);
        }
        warn!(peer = %self.addr, "Rejecting untrusted peer host key");
        Ok(false)
    }
}

struct SshTunnelClient {
    handle: Handle<PeerHostKeyCheck>,
}

#[async_trait]
impl TunnelClient for SshTunnelClient {
    async fn new_session(&mut self) -> Result<Box<dyn TunnelSession>> {
        let channel = self.handle.channel_open_session().await?;
        Ok(Box::new(SshTunnelSession {
            channel: Some(channel),
        }))
    }

    fn close(self: Box<Self>) {
        let handle = self.handle;
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = handle
                    .disconnect(Disconnect::ByApplication, "", "en")
                    .await
                {
                    debug!(error = %e, "Peer proxy disconnect failed");
                }
            });
        }
    }
}

struct SshTunnelSession {
    channel: Option<Channel<Msg>>,
}

impl SshTunnelSession {
    fn channel_mut(&mut self) -> Result<&mut Channel<Msg>> {
        self.channel
            .as_mut()
            .ok_or_else(|| Error::Connection("Session stdio already taken".to_string()))
    }
}

#[async_trait]
impl TunnelSession for SshTunnelSession {
    async fn request_subsystem(&mut self, name: &str) -> Result<()> {
        let channel = self.channel_mut()?;
        channel.request_subsystem(true, name).await?;

        loop {
            match channel.wait().await {
                Some(ChannelMsg::Success) => return Ok(()),
                Some(ChannelMsg::Failure) => {
                    return Err(Error::Connection(format!(
                        "Peer refused subsystem '{}'",
                        name
                    )));
                }
                Some(ChannelMsg::Close) | None => {
                    return Err(Error::Connection(format!(
                        "Session closed while requesting subsystem '{}'",
                        name
                    )));
                }
                Some(_) => continue,
            }
        }
    }

    fn stdio(&mut self) -> Result<Box<dyn Stream>> {
        let channel = self
            .channel
            .take()
            .ok_or_else(|| Error::Connection("Session stdio already taken".to_string()))?;
        Ok(Box::new(channel.into_stream()))
    }

    fn close(self: Box<Self>) {
        // Once stdio is taken the stream owns the channel.
        let Some(channel) = self.channel else {
            return;
        };
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                let _ = channel.close().await;
            });
        }
    }
}
