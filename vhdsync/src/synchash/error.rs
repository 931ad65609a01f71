//! Error types for fingerprint generation and reading.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::error::ErrorKind;

/// Result type for synchash operations.
pub type SynchashResult<T> = Result<T, SynchashError>;

/// Errors raised while generating or reading `.synchash` files.
#[derive(Debug, Error)]
pub enum SynchashError {
    /// Block size of zero.
    #[error("invalid block size {0}: must be greater than zero")]
    InvalidBlockSize(u32),

    /// Input path has no final component to name the output after.
    #[error("cannot derive a file name from {}", .0.display())]
    MissingFileName(PathBuf),

    /// Source name does not fit the fixed header field.
    #[error("source name '{name}' is {len} bytes, at most {max} fit in the header")]
    SourceNameTooLong { name: String, len: usize, max: usize },

    /// Failed to open the input image.
    #[error("failed to open {}: {source}", .path.display())]
    OpenInput { path: PathBuf, source: io::Error },

    /// Failed while reading the input image.
    #[error("failed to read {}: {source}", .path.display())]
    ReadInput { path: PathBuf, source: io::Error },

    /// The input changed size while it was being fingerprinted.
    #[error("{} changed while hashing: expected {expected} bytes, found {actual}", .path.display())]
    InputChanged {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// Failed to create the output file.
    #[error("failed to create fingerprint in {}: {source}", .path.display())]
    CreateOutput { path: PathBuf, source: io::Error },

    /// Failed to write the output file.
    #[error("failed to write {}: {source}", .path.display())]
    WriteOutput { path: PathBuf, source: io::Error },

    /// Failed to move the finished fingerprint into place.
    #[error("failed to persist {}: {source}", .path.display())]
    Persist { path: PathBuf, source: io::Error },

    /// Failed to read an existing fingerprint file.
    #[error("failed to read fingerprint {}: {source}", .path.display())]
    ReadFingerprint { path: PathBuf, source: io::Error },

    /// Header bytes are inconsistent.
    #[error("invalid fingerprint header: {0}")]
    InvalidHeader(String),

    /// Header was written by an incompatible format revision.
    #[error("unsupported fingerprint version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    /// Header names a hash algorithm this build does not know.
    #[error("unknown hash algorithm id {0}")]
    UnknownHashAlgorithm(u32),

    /// File length does not match the record count in the header.
    #[error("fingerprint {} is {actual} bytes, header implies {expected}", .path.display())]
    LengthMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// Requested block index past the last record.
    #[error("block {index} out of range ({count} blocks)")]
    BlockOutOfRange { index: u64, count: u64 },
}

impl SynchashError {
    /// Classify the error for reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidBlockSize(_)
            | Self::MissingFileName(_)
            | Self::SourceNameTooLong { .. } => ErrorKind::Config,
            _ => ErrorKind::Io,
        }
    }
}
