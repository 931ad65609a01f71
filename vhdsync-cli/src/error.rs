//! CLI error type.

use std::fmt;
use std::io;

use vhdsync::config::ConfigError;
use vhdsync::download::DownloadError;
use vhdsync::synchash::SynchashError;
use vhdsync::ErrorKind;

/// Errors surfaced by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// A command-line value is out of range or inconsistent.
    InvalidArgument(String),
    /// Configuration file problem.
    Config(ConfigError),
    /// The download action failed.
    Download(DownloadError),
    /// Fingerprint generation or reading failed.
    Synchash(SynchashError),
    /// Logging could not be initialized.
    Logging(io::Error),
}

impl CliError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) | Self::Config(_) | Self::Logging(_) => ErrorKind::Config,
            Self::Download(e) => e.kind(),
            Self::Synchash(e) => e.kind(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Self::Config(_) => write!(f, "Configuration error"),
            Self::Download(e) => write!(f, "Download failed ({} error)", e.kind()),
            Self::Synchash(e) => write!(f, "Fingerprint failed ({} error)", e.kind()),
            Self::Logging(_) => write!(f, "Failed to initialize logging"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidArgument(_) => None,
            Self::Config(e) => Some(e),
            Self::Download(e) => Some(e),
            Self::Synchash(e) => Some(e),
            Self::Logging(e) => Some(e),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<DownloadError> for CliError {
    fn from(e: DownloadError) -> Self {
        Self::Download(e)
    }
}

impl From<SynchashError> for CliError {
    fn from(e: SynchashError) -> Self {
        Self::Synchash(e)
    }
}
