//! Configuration for revtunnel
//!
//! Loads the TOML configuration file and turns it into typed settings for
//! the sites and the peer tunnel transport.

mod file;

use crate::site::{
    DEFAULT_DIAL_TIMEOUT, DEFAULT_HOST_CERT_CAPACITY, DEFAULT_HOST_CERT_TTL,
    DEFAULT_OFFLINE_THRESHOLD, SiteSettings,
};
use crate::tunnel::SshTunnelConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use file::{
    ConfigFile, ConfigPath, config_search_paths, find_config_file, load_config,
    load_config_or_default,
};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Route local dials through the recording forwarder
    #[serde(default = "default_recording_proxy_enabled")]
    pub recording_proxy_enabled: bool,

    /// Time without heartbeat after which a peer proxy is offline
    /// Format: "25s", "1m", etc.
    #[serde(default = "default_offline_threshold")]
    pub offline_threshold: String,

    /// Outbound connections to peer proxies
    #[serde(default)]
    pub peer: PeerConfig,

    /// Host certificate cache for recording mode
    #[serde(default)]
    pub host_cert_cache: HostCertCacheConfig,
}

/// How this proxy connects to peer proxies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeerConfig {
    /// User to authenticate as
    #[serde(default = "default_peer_user")]
    pub user: String,

    /// Private key used for authentication
    /// Supports environment variable and tilde expansion
    #[serde(default = "default_identity_file")]
    pub identity_file: String,

    /// Deadline for the outbound connect
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout: String,

    /// Host keys of peer proxies, in authorized_keys format
    #[serde(default)]
    pub trusted_host_keys: Vec<String>,

    /// Skip host key verification (testing only)
    #[serde(default)]
    pub insecure_accept_any_host_key: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostCertCacheConfig {
    /// Lifetime of a cached certificate
    #[serde(default = "default_host_cert_ttl")]
    pub ttl: String,

    /// Maximum number of cached certificates
    #[serde(default = "default_host_cert_capacity")]
    pub capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recording_proxy_enabled: default_recording_proxy_enabled(),
            offline_threshold: default_offline_threshold(),
            peer: PeerConfig::default(),
            host_cert_cache: HostCertCacheConfig::default(),
        }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            user: default_peer_user(),
            identity_file: default_identity_file(),
            dial_timeout: default_dial_timeout(),
            trusted_host_keys: Vec::new(),
            insecure_accept_any_host_key: false,
        }
    }
}

impl Default for HostCertCacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_host_cert_ttl(),
            capacity: default_host_cert_capacity(),
        }
    }
}

fn default_recording_proxy_enabled() -> bool {
    true
}

fn default_offline_threshold() -> String {
    format!("{}s", DEFAULT_OFFLINE_THRESHOLD.as_secs())
}

fn default_peer_user() -> String {
    crate::NAME.to_string()
}

fn default_identity_file() -> String {
    "~/.ssh/id_ed25519".to_string()
}

fn default_dial_timeout() -> String {
    format!("{}s", DEFAULT_DIAL_TIMEOUT.as_secs())
}

fn default_host_cert_ttl() -> String {
    format!("{}h", DEFAULT_HOST_CERT_TTL.as_secs() / 3600)
}

fn default_host_cert_capacity() -> usize {
    DEFAULT_HOST_CERT_CAPACITY
}

impl Config {
    /// Expand paths and parse durations
    pub fn expand(&self) -> crate::Result<ExpandedConfig> {
        if self.host_cert_cache.capacity == 0 {
            return Err(crate::Error::Config(
                "host_cert_cache.capacity must be at least 1".to_string(),
            ));
        }

        Ok(ExpandedConfig {
            recording_proxy_enabled: self.recording_proxy_enabled,
            offline_threshold: parse_duration(&self.offline_threshold)?,
            peer: ExpandedPeerConfig {
                user: self.peer.user.clone(),
                identity_file: PathBuf::from(expand_path(&self.peer.identity_file)?),
                dial_timeout: parse_duration(&self.peer.dial_timeout)?,
                trusted_host_keys: self.peer.trusted_host_keys.clone(),
                insecure_accept_any_host_key: self.peer.insecure_accept_any_host_key,
            },
            host_cert_ttl: parse_duration(&self.host_cert_cache.ttl)?,
            host_cert_capacity: self.host_cert_cache.capacity,
        })
    }
}

/// Configuration with paths expanded and durations parsed
#[derive(Debug, Clone)]
pub struct ExpandedConfig {
    pub recording_proxy_enabled: bool,
    pub offline_threshold: Duration,
    pub peer: ExpandedPeerConfig,
    pub host_cert_ttl: Duration,
    pub host_cert_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct ExpandedPeerConfig {
    pub user: String,
    /// Resolved identity file path
    pub identity_file: PathBuf,
    pub dial_timeout: Duration,
    pub trusted_host_keys: Vec<String>,
    pub insecure_accept_any_host_key: bool,
}

impl ExpandedConfig {
    /// Settings shared by all sites
    pub fn site_settings(&self) -> SiteSettings {
        SiteSettings {
            recording_proxy_enabled: self.recording_proxy_enabled,
            offline_threshold: self.offline_threshold,
            dial_timeout: self.peer.dial_timeout,
            host_cert_ttl: self.host_cert_ttl,
            host_cert_capacity: self.host_cert_capacity,
        }
    }

    /// Settings of the SSH transport to peer proxies
    pub fn ssh_tunnel_config(&self) -> SshTunnelConfig {
        SshTunnelConfig {
            user: self.peer.user.clone(),
            identity_file: self.peer.identity_file.clone(),
            trusted_host_keys: self.peer.trusted_host_keys.clone(),
            insecure_accept_any_host_key: self.peer.insecure_accept_any_host_key,
        }
    }
}

/// Expand environment variables and tilde in a path string
pub fn expand_path(path: &str) -> crate::Result<String> {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .map_err(|e| crate::Error::Config(format!("Failed to expand path '{}': {}", path, e)))
}

/// Parse a duration string like "25s", "30m", "24h", "1d"
pub fn parse_duration(s: &str) -> crate::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::Config("Empty duration string".to_string()));
    }

    let (num_str, unit) = s
        .char_indices()
        .find(|(_, c)| c.is_alphabetic())
        .map(|(i, _)| (&s[..i], &s[i..]))
        .unwrap_or((s, "s"));

    let num: u64 = num_str.trim().parse().map_err(|e| {
        crate::Error::Config(format!("Invalid duration number '{}': {}", num_str, e))
    })?;

    let multiplier = match unit.to_lowercase().as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 60 * 60,
        "d" | "day" | "days" => 60 * 60 * 24,
        "w" | "week" | "weeks" => 60 * 60 * 24 * 7,
        _ => {
            return Err(crate::Error::Config(format!(
                "Unknown duration unit '{}' in '{}'",
                unit, s
            )));
        }
    };

    num.checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| crate::Error::Config(format!("Duration '{}' is too large", s)))
}
