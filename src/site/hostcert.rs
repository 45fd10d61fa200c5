//! Host certificates for recording-mode dials
//!
//! The recording forwarder presents a host certificate for the target it
//! impersonates. Signing is an API round trip and may be rate limited, so
//! certificates are cached per target address and concurrent requests for
//! the same address share a single signing request.

use crate::auth::{AuthClient, HostCertRequest};
use crate::error::{Error, Result};
use crate::net::split_host_port;
use ssh_key::rand_core::OsRng;
use ssh_key::{Algorithm, Certificate, PrivateKey};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

/// A host key pair together with its signed certificate
pub struct HostCertificate {
    private_key: PrivateKey,
    certificate: Certificate,
}

impl HostCertificate {
    pub fn new(private_key: PrivateKey, certificate: Certificate) -> Self {
        Self {
            private_key,
            certificate,
        }
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Principals the certificate is valid for
    pub fn principals(&self) -> &[String] {
        self.certificate.valid_principals()
    }
}

impl fmt::Debug for HostCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCertificate")
            .field("key_id", &self.certificate.key_id())
            .field("principals", &self.certificate.valid_principals())
            .field("valid_before", &self.certificate.valid_before())
            .finish_non_exhaustive()
    }
}

struct CacheEntry {
    certificate: Arc<HostCertificate>,
    expires_at: Instant,
}

type Slot = Arc<OnceCell<CacheEntry>>;

/// Upper bound on how far ahead an entry's expiry is placed
const MAX_CACHE_LIFETIME: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Cache of host certificates keyed by target address
pub struct HostCertificateCache {
    client: Arc<dyn AuthClient>,
    ttl: Duration,
    capacity: usize,
    /// A slot without a value is either being fetched or its last fetch failed
    slots: Mutex<HashMap<String, Slot>>,
}

impl HostCertificateCache {
    pub fn new(client: Arc<dyn AuthClient>, ttl: Duration, capacity: usize) -> Self {
        Self {
            client,
            ttl,
            capacity: capacity.max(1),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Certificate for `addr`, signing a new one if none is cached
    ///
    /// Signing errors are returned as reported by the API client and leave
    /// nothing cached, so the next call retries.
    pub async fn get(&self, addr: &str) -> Result<Arc<HostCertificate>> {
        let slot = self.slot(addr);
        match slot.get_or_try_init(|| self.generate(addr)).await {
            Ok(entry) => Ok(Arc::clone(&entry.certificate)),
            Err(e) => {
                self.release(addr, &slot);
                Err(e)
            }
        }
    }

    /// Number of addresses currently tracked
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, addr: &str) -> Slot {
        let now = Instant::now();
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(slot) = slots.get(addr) {
            match slot.get() {
                Some(entry) if entry.expires_at > now => {
                    trace!(addr = %addr, "Host certificate cache hit");
                    return Arc::clone(slot);
                }
                None => return Arc::clone(slot),
                Some(_) => trace!(addr = %addr, "Host certificate expired"),
            }
        } else if slots.len() >= self.capacity {
            evict(&mut slots, now);
        }

        let slot: Slot = Arc::new(OnceCell::new());
        slots.insert(addr.to_string(), Arc::clone(&slot));
        slot
    }

    /// Forget a slot whose fetch failed, unless another fetch has filled or replaced it
    fn release(&self, addr: &str, slot: &Slot) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let stale = slots
            .get(addr)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && !current.initialized());
        if stale {
            slots.remove(addr);
        }
    }

    async fn generate(&self, addr: &str) -> Result<CacheEntry> {
        let principal = principal_for(addr).to_string();
        let cluster_name = self.client.get_domain_name().await?;

        let private_key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519)
            .map_err(|e| Error::Certificate(format!("Failed to generate host key: {}", e)))?;

        debug!(addr = %addr, principal = %principal, cluster = %cluster_name, "Requesting host certificate");
        let certificate = self
            .client
            .generate_host_cert(HostCertRequest {
                public_key: private_key.public_key().clone(),
                host_id: principal.clone(),
                node_name: principal.clone(),
                principals: vec![principal],
                cluster_name,
                ttl: self.ttl,
            })
            .await?;

        if certificate.public_key() != private_key.public_key().key_data() {
            return Err(Error::Certificate(format!(
                "Certificate issued for {} does not match the generated key",
                addr
            )));
        }

        let lifetime = self.lifetime(&certificate);
        Ok(CacheEntry {
            certificate: Arc::new(HostCertificate::new(private_key, certificate)),
            expires_at: expiry(Instant::now(), lifetime),
        })
    }

    /// Cache lifetime: the configured TTL, cut short by the certificate's expiry
    fn lifetime(&self, certificate: &Certificate) -> Duration {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let remaining = Duration::from_secs(certificate.valid_before().saturating_sub(now));
        self.ttl.min(remaining)
    }
}

/// `now + lifetime`, clamped for lifetimes beyond what `Instant` can hold
fn expiry(now: Instant, lifetime: Duration) -> Instant {
    now.checked_add(lifetime)
        .or_else(|| now.checked_add(MAX_CACHE_LIFETIME))
        .unwrap_or(now)
}

/// Make room for one more slot: drop expired entries, then the one expiring soonest
///
/// Empty slots survive only while a fetch still holds them.
fn evict(slots: &mut HashMap<String, Slot>, now: Instant) {
    slots.retain(|_, slot| match slot.get() {
        Some(entry) => entry.expires_at > now,
        None => Arc::strong_count(slot) > 1,
    });

    let soonest = slots
        .iter()
        .filter_map(|(addr, slot)| slot.get().map(|entry| (addr, entry.expires_at)))
        .min_by_key(|(_, expires_at)| *expires_at)
        .map(|(addr, _)| addr.clone());
    if let Some(addr) = soonest {
        slots.remove(&addr);
    }
}

/// Host part of `addr`, used as the certificate principal
fn principal_for(addr: &str) -> &str {
    split_host_port(addr).map_or(addr, |(host, _)| host)
}
