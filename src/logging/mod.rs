//! Logging setup using tracing and tracing-subscriber
//!
//! Human-readable logs go to stderr so that `revtunnel dial` can keep
//! stdout for the tunneled byte stream. `RUST_LOG` overrides the level
//! chosen by the verbose/quiet flags.

use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Logging configuration
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Verbosity level adjustment: -1 for quiet, 0 for normal, +1 for verbose
    pub verbosity: i8,
    /// Emit JSON lines instead of the compact text format
    pub json: bool,
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verbose(mut self) -> Self {
        self.verbosity = 1;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.verbosity = -1;
        self
    }

    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }

    fn min_level(&self) -> Level {
        match self.verbosity {
            v if v < 0 => Level::WARN,
            0 => Level::INFO,
            _ => Level::DEBUG,
        }
    }
}

/// Initialize logging from the global command-line flags
pub fn init(verbose: bool, quiet: bool, json: bool) -> crate::Result<()> {
    let config = LogConfig {
        verbosity: if quiet {
            -1
        } else if verbose {
            1
        } else {
            0
        },
        json,
    };
    init_with_config(config)
}

/// Install the global subscriber
///
/// Fails if a global subscriber is already set.
pub fn init_with_config(config: LogConfig) -> crate::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.min_level().into())
        .from_env_lossy();

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.json {
        tracing::subscriber::set_global_default(registry.with(stderr_layer.json()))
    } else {
        tracing::subscriber::set_global_default(registry.with(stderr_layer))
    };

    result.map_err(|e| crate::Error::Other(format!("Failed to set tracing subscriber: {}", e)))
}
