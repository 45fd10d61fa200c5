//! Argument structures for CLI commands

use clap::Args;
use clap_complete::Shell;

/// Arguments for the `dial` command
#[derive(Args, Debug, Clone)]
pub struct DialArgs {
    /// Target address inside the remote cluster (host:port)
    pub target: String,

    /// Address of the peer proxy to tunnel through
    #[arg(long, value_name = "HOST:PORT")]
    pub proxy_addr: String,

    /// Name of the remote cluster
    #[arg(long)]
    pub cluster: String,

    /// Network of the target address
    #[arg(long, default_value = "tcp", value_parser = ["tcp", "tcp4", "tcp6"])]
    pub network: String,

    /// Source address reported for the dial
    #[arg(long, default_value = "127.0.0.1:0")]
    pub from: String,
}

/// Arguments for the `config` command
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Show configuration search paths
    #[arg(long)]
    pub paths: bool,

    /// Show an example configuration
    #[arg(long)]
    pub example: bool,

    /// Validate configuration only
    #[arg(long)]
    pub validate: bool,

    /// Output format
    #[arg(short, long, default_value = "toml", value_parser = ["toml", "json"])]
    pub format: String,
}

/// Arguments for the `version` command
#[derive(Args, Debug, Clone)]
pub struct VersionArgs {
    /// Show build details
    #[arg(long)]
    pub verbose: bool,
}

/// Arguments for the `completion` command
#[derive(Args, Debug, Clone)]
pub struct CompletionArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
