//! Lifecycle of a download session.

use std::fmt;

/// Where a [`DownloadSession`](super::DownloadSession) is in its lifecycle.
///
/// ```text
/// Created ─► SizeKnown ─► Downloading ─► Completed ─► Finalized
///    │           │
///    └───────────┴─► AlreadyExists
///
/// any state ─► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Options validated, nothing fetched.
    Created,
    /// Remote size discovered.
    SizeKnown,
    /// Ranged transfers in progress.
    Downloading,
    /// All bytes are in the partial file.
    Completed,
    /// Partial file renamed to its final name.
    Finalized,
    /// The final file was already present.
    AlreadyExists,
    /// An operation failed; re-running resumes from the partial file.
    Failed,
}

impl SessionState {
    /// No further operations are meaningful.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::AlreadyExists)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::SizeKnown => "size-known",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Finalized => "finalized",
            Self::AlreadyExists => "already-exists",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
