//! Common types and utilities shared across CLI commands.

use clap::ValueEnum;
use vhdsync::checksum::HashAlgorithm;

/// Strong hash selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum HashArg {
    /// SHA-1, 20-byte digests
    Sha1,
    /// MD5, 16-byte digests
    Md5,
    /// SHA-256, 32-byte digests
    Sha256,
}

impl From<HashArg> for HashAlgorithm {
    fn from(arg: HashArg) -> Self {
        match arg {
            HashArg::Sha1 => HashAlgorithm::Sha1,
            HashArg::Md5 => HashAlgorithm::Md5,
            HashArg::Sha256 => HashAlgorithm::Sha256,
        }
    }
}

/// CLI value if given, otherwise the config file value.
pub fn resolve<T>(cli: Option<T>, config: T) -> T {
    cli.unwrap_or(config)
}
