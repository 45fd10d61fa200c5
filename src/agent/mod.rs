//! Forwarded SSH agents
//!
//! The recording forwarder authenticates to target servers on behalf of
//! the user with the agent the user forwarded to the proxy. This module
//! provides the [`Agent`] abstraction handed to the forwarder and a
//! channel-backed implementation speaking the SSH agent protocol.

mod codec;
mod message;

pub use codec::AgentCodec;
pub use message::{AgentMessage, Identity, MessageType};

use crate::error::{Error, Result};
use crate::net::Stream;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::trace;

/// An SSH agent reachable by the proxy
#[async_trait]
pub trait Agent: Send + Sync {
    /// Send one request and wait for its response
    async fn request(&self, msg: AgentMessage) -> Result<AgentMessage>;

    /// List the keys held by the agent
    async fn list_identities(&self) -> Result<Vec<Identity>> {
        self.request(AgentMessage::request_identities())
            .await?
            .parse_identities()
    }

    /// Sign `data` with the key identified by `key_blob`
    async fn sign(&self, key_blob: &[u8], data: &[u8], flags: u32) -> Result<Bytes> {
        let response = self
            .request(AgentMessage::sign_request(key_blob, data, flags)?)
            .await?;
        if response.msg_type == MessageType::Failure {
            return Err(Error::Agent("Agent refused to sign".to_string()));
        }
        response.parse_signature()
    }
}

/// Agent speaking the protocol over a forwarded agent channel
///
/// The channel is owned by the agent: replacing or dropping the agent
/// closes the channel.
pub struct ChannelAgent {
    channel: Mutex<Box<dyn Stream>>,
}

impl ChannelAgent {
    pub fn new(channel: Box<dyn Stream>) -> Self {
        Self {
            channel: Mutex::new(channel),
        }
    }
}

#[async_trait]
impl Agent for ChannelAgent {
    async fn request(&self, msg: AgentMessage) -> Result<AgentMessage> {
        let mut channel = self.channel.lock().await;
        trace!(msg_type = ?msg.msg_type, "Sending request to forwarded agent");

        AgentCodec::write(&mut *channel, &msg).await?;
        let response = AgentCodec::read(&mut *channel).await?.ok_or_else(|| {
            Error::Agent("Forwarded agent channel closed unexpectedly".to_string())
        })?;

        trace!(response_type = ?response.msg_type, "Received response from forwarded agent");
        Ok(response)
    }
}
