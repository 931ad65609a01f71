//! Error types for resumable downloads.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::error::ErrorKind;

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Errors that can occur while downloading an image.
#[derive(Debug, Error)]
pub enum DownloadError {
    // Configuration
    /// A required option was empty or malformed.
    #[error("invalid option {option}: {reason}")]
    InvalidOption {
        option: &'static str,
        reason: String,
    },

    /// Destination directory does not exist or is not a directory.
    #[error("destination directory {} does not exist", .0.display())]
    DirectoryNotFound(PathBuf),

    /// The image name is not a bare file name.
    #[error("image name '{0}' must be a plain file name")]
    InvalidImageName(String),

    /// Chunk size of zero.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    /// `start` was called before the remote size was discovered.
    #[error("remote size is unknown; discover it before starting")]
    SizeUnknown,

    /// `finalize` was called before the transfer completed.
    #[error("cannot finalize a download in state {state}")]
    NotCompleted { state: String },

    /// Credentials are not of the form `user:password`.
    #[error("credentials must be of the form user:password")]
    InvalidCredentials,

    /// A CA certificate could not be loaded.
    #[error("failed to load CA certificate {}: {reason}", .path.display())]
    CaCertificate { path: PathBuf, reason: String },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),

    // Transport
    /// A request could not be sent or its response could not be read.
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// Request timed out.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    /// The server answered with an unexpected status.
    #[error("{method} {url} returned HTTP {status}")]
    HttpStatus {
        method: &'static str,
        url: String,
        status: u16,
    },

    /// HEAD response carried no `Content-Length`.
    #[error("{url} did not report a content length")]
    MissingContentLength { url: String },

    /// `Content-Length` was not a number.
    #[error("{url} reported an invalid content length '{value}'")]
    InvalidContentLength { url: String, value: String },

    /// The server ignored the requested range.
    #[error("{url} did not honor range {range} (HTTP {status})")]
    RangeNotHonored {
        url: String,
        range: String,
        status: u16,
    },

    /// Fewer bytes than requested arrived for a range.
    #[error("range {range} of {url}: expected {expected} bytes, received {received}")]
    ShortRead {
        url: String,
        range: String,
        expected: u64,
        received: u64,
    },

    /// The server rejected the supplied credentials.
    #[error("authentication with {url} failed: {reason}")]
    AuthenticationFailed { url: String, reason: String },

    /// I/O on a pre-connected socket failed.
    #[error("connection error: {0}")]
    Connection(#[source] io::Error),

    // Local I/O
    /// Writing received bytes to the destination failed.
    #[error("failed to write received data: {0}")]
    Sink(#[source] io::Error),

    /// The partial file could not be opened or inspected.
    #[error("failed to open partial file {}: {source}", .path.display())]
    OpenPartial { path: PathBuf, source: io::Error },

    /// Writing or syncing the partial file failed.
    #[error("failed to write partial file {}: {source}", .path.display())]
    WritePartial { path: PathBuf, source: io::Error },

    /// The partial file is longer than the remote resource.
    #[error(
        "partial file {} is {partial} bytes but the remote image is {total} bytes",
        .path.display()
    )]
    PartialTooLarge {
        path: PathBuf,
        partial: u64,
        total: u64,
    },

    /// Renaming the finished partial file failed.
    #[error("failed to rename {} to {}: {source}", .from.display(), .to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

impl DownloadError {
    /// Classify the error for reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidOption { .. }
            | Self::DirectoryNotFound(_)
            | Self::InvalidImageName(_)
            | Self::InvalidChunkSize
            | Self::SizeUnknown
            | Self::NotCompleted { .. }
            | Self::InvalidCredentials
            | Self::CaCertificate { .. }
            | Self::ClientBuild(_) => ErrorKind::Config,

            Self::Request { .. }
            | Self::Timeout { .. }
            | Self::HttpStatus { .. }
            | Self::MissingContentLength { .. }
            | Self::InvalidContentLength { .. }
            | Self::RangeNotHonored { .. }
            | Self::ShortRead { .. }
            | Self::AuthenticationFailed { .. }
            | Self::Connection(_) => ErrorKind::Transport,

            Self::Sink(_)
            | Self::OpenPartial { .. }
            | Self::WritePartial { .. }
            | Self::PartialTooLarge { .. }
            | Self::Rename { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn request(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::Request {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
