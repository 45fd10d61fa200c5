//! Command implementations for the revtunnel CLI

pub mod completion;
pub mod config;
pub mod dial;
pub mod version;
