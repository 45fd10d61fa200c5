//! revtunnel - routing core of a reverse-tunnel SSH proxy
//!
//! Remote clusters without inbound connectivity dial out to the proxy and
//! register tunnel connections. This library selects a registered site and
//! dials targets through it: directly (or through a recording forwarder) for
//! the proxy's own cluster, and through a peer proxy's SSH subsystem for
//! remote clusters.

pub mod agent;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod forward;
pub mod logging;
pub mod net;
pub mod site;
pub mod tunnel;

pub use error::{Error, Result};

/// Package version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name
pub const NAME: &str = env!("CARGO_PKG_NAME");
