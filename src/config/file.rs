//! Configuration file discovery and loading

use std::path::{Path, PathBuf};

use super::Config;

/// A loaded configuration and where it came from
#[derive(Debug, Clone)]
pub struct ConfigFile {
    /// Path the configuration was read from; empty for built-in defaults
    pub path: PathBuf,

    pub config: Config,
}

/// A place a configuration file is looked for
#[derive(Debug, Clone)]
pub struct ConfigPath {
    pub path: PathBuf,
    /// Where the location comes from, for `revtunnel config --paths`
    pub description: &'static str,
}

/// Configuration search paths in priority order
///
/// A user's own file wins over the system-wide one, which is where a proxy
/// running as a service keeps its settings. The platform config directory
/// honors `$XDG_CONFIG_HOME` on Linux.
pub fn config_search_paths() -> Vec<ConfigPath> {
    let user_dir = dirs::config_dir().map(|dir| dir.join("revtunnel").join("config.toml"));
    let home_file = dirs::home_dir().map(|home| home.join(".revtunnel.toml"));
    let system_file = cfg!(unix).then(|| PathBuf::from("/etc/revtunnel/config.toml"));

    [
        (user_dir, "user config directory"),
        (home_file, "home directory"),
        (system_file, "system-wide"),
    ]
    .into_iter()
    .filter_map(|(path, description)| path.map(|path| ConfigPath { path, description }))
    .collect()
}

/// Find the configuration file in standard locations
pub fn find_config_file() -> Option<PathBuf> {
    for cp in config_search_paths() {
        if cp.path.is_file() {
            tracing::info!(path = %cp.path.display(), "Found configuration file");
            return Some(cp.path);
        }
    }

    tracing::debug!("No configuration file found in standard locations");
    None
}

/// Load configuration from the specified path
pub fn load_config(path: &Path) -> crate::Result<ConfigFile> {
    tracing::debug!(path = %path.display(), "Loading configuration");

    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to read configuration file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let config: Config = toml::from_str(&content).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to parse configuration file '{}': {}",
            path.display(),
            e
        ))
    })?;

    Ok(ConfigFile {
        path: path.to_path_buf(),
        config,
    })
}

/// Load `path` if given, else the first file found in the standard
/// locations, else the built-in defaults
pub fn load_config_or_default(path: Option<&Path>) -> crate::Result<ConfigFile> {
    if let Some(path) = path {
        return load_config(path);
    }
    match find_config_file() {
        Some(path) => load_config(&path),
        None => {
            tracing::info!("No configuration file found, using defaults");
            Ok(ConfigFile {
                path: PathBuf::new(),
                config: Config::default(),
            })
        }
    }
}
