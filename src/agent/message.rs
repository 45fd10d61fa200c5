//! SSH agent protocol messages
//!
//! Only the subset the recording forwarder needs from a forwarded agent is
//! modelled: listing identities and signing.

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use ssh_key::{Fingerprint, HashAlg, PublicKey};

/// Maximum number of identities accepted in a single answer
const MAX_IDENTITIES: u32 = 10000;

/// Maximum size for a single length-prefixed field (16 MB)
const MAX_FIELD_SIZE: u32 = 16 * 1024 * 1024;

/// SSH agent message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Failure,
    Success,
    RequestIdentities,
    IdentitiesAnswer,
    SignRequest,
    SignResponse,
    Other(u8),
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            5 => MessageType::Failure,
            6 => MessageType::Success,
            11 => MessageType::RequestIdentities,
            12 => MessageType::IdentitiesAnswer,
            13 => MessageType::SignRequest,
            14 => MessageType::SignResponse,
            other => MessageType::Other(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Failure => 5,
            MessageType::Success => 6,
            MessageType::RequestIdentities => 11,
            MessageType::IdentitiesAnswer => 12,
            MessageType::SignRequest => 13,
            MessageType::SignResponse => 14,
            MessageType::Other(b) => b,
        }
    }
}

/// A key held by the agent
#[derive(Debug, Clone)]
pub struct Identity {
    /// Raw public key blob
    pub key_blob: Bytes,
    /// Comment associated with the key
    pub comment: String,
}

impl Identity {
    pub fn new(key_blob: Bytes, comment: String) -> Self {
        Self { key_blob, comment }
    }

    /// Parse the key blob
    pub fn public_key(&self) -> Result<PublicKey> {
        Ok(PublicKey::from_bytes(&self.key_blob)?)
    }

    /// SHA256 fingerprint of the key, if the blob parses
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.public_key()
            .ok()
            .map(|k| k.fingerprint(HashAlg::Sha256))
    }
}

/// A single framed agent message
#[derive(Debug, Clone)]
pub struct AgentMessage {
    pub msg_type: MessageType,
    /// Payload excluding the type byte
    pub payload: Bytes,
}

impl AgentMessage {
    pub fn new(msg_type: MessageType, payload: Bytes) -> Self {
        Self { msg_type, payload }
    }

    pub fn failure() -> Self {
        Self::new(MessageType::Failure, Bytes::new())
    }

    pub fn request_identities() -> Self {
        Self::new(MessageType::RequestIdentities, Bytes::new())
    }

    /// Build a sign request for `data` with the key identified by `key_blob`
    pub fn sign_request(key_blob: &[u8], data: &[u8], flags: u32) -> Result<Self> {
        let mut payload = BytesMut::new();
        put_field(&mut payload, key_blob)?;
        put_field(&mut payload, data)?;
        payload.put_u32(flags);
        Ok(Self::new(MessageType::SignRequest, payload.freeze()))
    }

    /// Build an identities answer
    pub fn identities_answer(identities: &[Identity]) -> Result<Self> {
        let count = u32::try_from(identities.len())
            .map_err(|_| Error::InvalidMessage("Too many identities".to_string()))?;
        let mut payload = BytesMut::new();
        payload.put_u32(count);
        for identity in identities {
            put_field(&mut payload, &identity.key_blob)?;
            put_field(&mut payload, identity.comment.as_bytes())?;
        }
        Ok(Self::new(MessageType::IdentitiesAnswer, payload.freeze()))
    }

    /// Parse identities out of an identities answer
    pub fn parse_identities(&self) -> Result<Vec<Identity>> {
        self.expect_type(MessageType::IdentitiesAnswer)?;

        let mut buf = &self.payload[..];
        if buf.remaining() < 4 {
            return Err(Error::InvalidMessage("Message too short".to_string()));
        }
        let count = buf.get_u32();
        if count > MAX_IDENTITIES {
            return Err(Error::InvalidMessage(format!(
                "Identity count {} exceeds maximum allowed {}",
                count, MAX_IDENTITIES
            )));
        }

        let mut identities = Vec::new();
        for _ in 0..count {
            let key_blob = get_field(&mut buf, "key blob")?;
            let comment = get_field(&mut buf, "comment")?;
            identities.push(Identity::new(
                key_blob,
                String::from_utf8_lossy(&comment).into_owned(),
            ));
        }
        Ok(identities)
    }

    /// Extract the signature blob from a sign response
    pub fn parse_signature(&self) -> Result<Bytes> {
        self.expect_type(MessageType::SignResponse)?;
        let mut buf = &self.payload[..];
        get_field(&mut buf, "signature")
    }

    /// Encode including the length prefix
    pub fn encode(&self) -> Bytes {
        let total_len = 1 + self.payload.len();
        let mut buf = BytesMut::with_capacity(4 + total_len);
        buf.put_u32(total_len as u32);
        buf.put_u8(self.msg_type.into());
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Decode a frame body (length prefix already stripped)
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (&type_byte, payload) = data
            .split_first()
            .ok_or_else(|| Error::InvalidMessage("Empty message".to_string()))?;
        Ok(Self::new(
            MessageType::from(type_byte),
            Bytes::copy_from_slice(payload),
        ))
    }

    fn expect_type(&self, expected: MessageType) -> Result<()> {
        if self.msg_type != expected {
            return Err(Error::InvalidMessage(format!(
                "Expected {:?}, got {:?}",
                expected, self.msg_type
            )));
        }
        Ok(())
    }
}

fn put_field(buf: &mut BytesMut, data: &[u8]) -> Result<()> {
    let len = u32::try_from(data.len())
        .ok()
        .filter(|len| *len <= MAX_FIELD_SIZE)
        .ok_or_else(|| Error::InvalidMessage(format!("Field of {} bytes too large", data.len())))?;
    buf.put_u32(len);
    buf.put_slice(data);
    Ok(())
}

fn get_field(buf: &mut &[u8], what: &str) -> Result<Bytes> {
    if buf.remaining() < 4 {
        return Err(Error::InvalidMessage(format!(
            "Unexpected end of message reading {}",
            what
        )));
    }
    let len = buf.get_u32();
    if len > MAX_FIELD_SIZE {
        return Err(Error::InvalidMessage(format!(
            "{} size {} exceeds maximum allowed {}",
            what, len, MAX_FIELD_SIZE
        )));
    }
    let len = len as usize;
    if buf.remaining() < len {
        return Err(Error::InvalidMessage(format!("{} truncated", what)));
    }
    let field = Bytes::copy_from_slice(&buf[..len]);
    buf.advance(len);
    Ok(field)
}
