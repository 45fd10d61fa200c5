//! Exit code definitions for revtunnel

use crate::Error;

/// Exit codes for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    /// General/unspecified error
    GeneralError = 1,
    /// Invalid configuration or missing required settings
    ConfigError = 2,
    /// Peer proxy or target unreachable
    ConnectionError = 3,
    /// No such peer, server or site
    NotFound = 4,
}

impl ExitCode {
    /// Exit code for the first revtunnel error in `err`'s chain
    pub fn for_error(err: &anyhow::Error) -> Self {
        let Some(err) = err.chain().find_map(|e| e.downcast_ref::<Error>()) else {
            return ExitCode::GeneralError;
        };
        match err {
            Error::Config(_) | Error::TomlParse(_) => ExitCode::ConfigError,
            Error::Connection(_) | Error::Timeout(_) | Error::Ssh(_) | Error::Io(_) => {
                ExitCode::ConnectionError
            }
            Error::NotFound(_) => ExitCode::NotFound,
            _ => ExitCode::GeneralError,
        }
    }
}

impl From<ExitCode> for u8 {
    fn from(code: ExitCode) -> Self {
        code as u8
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}
