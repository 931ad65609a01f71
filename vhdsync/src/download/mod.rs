//! Resumable HTTP download of disk images.
//!
//! This module provides:
//! - The chunked, resumable download session (`session`)
//! - The transport seam with reqwest and pre-connected socket
//!   implementations (`transport`, `socket`)
//! - HTTP Digest authentication (`auth`)
//! - Progress lines for a supervising process (`progress`)
//!
//! # Architecture
//!
//! ```text
//! DownloadSession
//!         │
//!         ├── Transport (trait)
//!         │       ├── HttpTransport ── DigestAuth
//!         │       └── SocketTransport
//!         │
//!         ├── ProgressReporter
//!         │
//!         └── <dir>/<name>.part ──rename──► <dir>/<name>
//! ```
//!
//! # Example
//!
//! ```ignore
//! use vhdsync::download::{
//!     DownloadSession, HttpTransport, ProgressReporter, SessionOptions, TransportConfig,
//! };
//!
//! let transport = HttpTransport::new(TransportConfig::default())?;
//! let options = SessionOptions::new("https://example.com/disk.vhd", "/var/images", "disk.vhd");
//! let mut session = DownloadSession::open(options, transport, ProgressReporter::none())?;
//! session.run()?;
//! ```

mod auth;
mod error;
mod progress;
mod session;
mod socket;
mod state;
mod transport;

pub use auth::{digest_response, Credentials, DigestAlgorithm, DigestAuth, DigestChallenge, DigestRequest};
pub use error::{DownloadError, DownloadResult};
pub use progress::{percent, ProgressReporter};
pub use session::{
    DownloadOutcome, DownloadSession, SessionOptions, StartOutcome, DEFAULT_CHUNK_SIZE,
    PARTIAL_SUFFIX,
};
pub use socket::SocketTransport;
pub use state::SessionState;
pub use transport::{
    ByteRange, HeadInfo, HttpTransport, Transport, TransportConfig, DEFAULT_TIMEOUT_SECS,
};
