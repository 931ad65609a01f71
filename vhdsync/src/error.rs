//! Error classification shared by all actions.

use std::fmt;

/// Broad class of a failure, used to decide how it is reported.
///
/// - `Config` errors are raised before any I/O happens.
/// - `Transport` errors abort the current attempt; a re-run resumes from the
///   partial file on disk.
/// - `Io` errors are local filesystem failures and are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Transport,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Config => write!(f, "configuration"),
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::Io => write!(f, "I/O"),
        }
    }
}
