//! Config command - show or validate configuration

use anyhow::{Context, Result, bail};
use std::path::Path;

use crate::cli::args::ConfigArgs;
use crate::config::{Config, config_search_paths, find_config_file, load_config};

/// Example configuration content
fn example_config() -> &'static str {
    r#"# revtunnel configuration file

# Route dials into the local cluster through the recording forwarder.
# When false, targets are dialed directly.
recording_proxy_enabled = true

# A peer proxy whose last heartbeat is older than this is offline.
offline_threshold = "25s"

[peer]
# User and key this proxy authenticates with on peer proxies
user = "revtunnel"
identity_file = "~/.ssh/id_ed25519"

# Deadline for connecting to a peer proxy
dial_timeout = "30s"

# Host keys of peer proxies, in authorized_keys format
trusted_host_keys = [
    # "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAA... proxy@peer",
]

[host_cert_cache]
# Lifetime of a cached host certificate (cut short by its own expiry)
ttl = "24h"

# Maximum number of cached host certificates
capacity = 4000
"#
}

/// Execute the config command
pub async fn execute(args: ConfigArgs, config_path: Option<&Path>) -> Result<()> {
    if args.paths {
        println!("Config search paths (in priority order):");
        for (i, cp) in config_search_paths().iter().enumerate() {
            let exists = if cp.path.exists() {
                "\x1b[32m[exists]\x1b[0m"
            } else {
                ""
            };
            println!("  {}. {} {}", i + 1, cp.description, exists);
            println!("     {}", cp.path.display());
        }
        return Ok(());
    }

    if args.example {
        match args.format.as_str() {
            "json" => {
                let config: Config =
                    toml::from_str(example_config()).context("Failed to parse example config")?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            _ => print!("{}", example_config()),
        }
        return Ok(());
    }

    let path = match config_path.map(Path::to_path_buf).or_else(find_config_file) {
        Some(path) => path,
        None if args.validate => {
            eprintln!("Searched locations (use --paths for details):");
            for cp in config_search_paths() {
                eprintln!("  - {}", cp.path.display());
            }
            bail!(crate::Error::Config("No configuration file found".to_string()));
        }
        None => {
            println!("# No configuration file found");
            println!("# Use 'config --paths' to see search locations");
            println!();
            print!("{}", example_config());
            return Ok(());
        }
    };

    let config_file = load_config(&path)?;
    let expanded = config_file
        .config
        .expand()
        .with_context(|| format!("Configuration file is invalid: {}", path.display()))?;

    if args.validate {
        println!("Configuration file is valid: {}", path.display());
        if !expanded.peer.identity_file.exists() {
            eprintln!(
                "Warning: identity file does not exist: {}",
                expanded.peer.identity_file.display()
            );
        }
        return Ok(());
    }

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&config_file.config)?),
        _ => {
            println!("# Configuration from: {}", path.display());
            println!();
            print!("{}", toml::to_string_pretty(&config_file.config)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses_and_expands() {
        let config: Config = toml::from_str(example_config()).unwrap();
        let settings = config.expand().unwrap().site_settings();
        assert!(settings.recording_proxy_enabled);
        assert_eq!(settings.host_cert_capacity, 4000);
    }
}
