//! Progress lines for a supervising process.
//!
//! Progress is written as `Progress : <percent>\n` lines to an optional sink,
//! typically a pipe inherited from the parent process. A percentage equal to
//! the previous one is not repeated.

use std::io::Write;

use tracing::warn;

/// Integer percentage of `current` out of `total`, floored.
///
/// Computed in 128-bit arithmetic so it cannot overflow; a `total` of zero
/// reports 100. The result is clamped to `0..=100`.
pub fn percent(current: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (u128::from(current) * 100) / u128::from(total);
    pct.min(100) as u8
}

/// Writes progress lines to an optional sink.
pub struct ProgressReporter {
    sink: Option<Box<dyn Write + Send>>,
    last: Option<u8>,
}

impl ProgressReporter {
    /// Reporter that discards all progress.
    pub fn none() -> Self {
        Self {
            sink: None,
            last: None,
        }
    }

    /// Reporter writing to `sink`.
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Some(sink),
            last: None,
        }
    }

    /// Reporter writing to an inherited file descriptor; `0` means none.
    ///
    /// # Safety
    ///
    /// A non-zero `fd` must be open for writing and owned by nobody else; it
    /// is closed when the reporter is dropped.
    #[cfg(unix)]
    pub unsafe fn from_raw_fd(fd: std::os::unix::io::RawFd) -> Self {
        use std::os::unix::io::FromRawFd;
        if fd == 0 {
            return Self::none();
        }
        Self::new(Box::new(std::fs::File::from_raw_fd(fd)))
    }

    /// Whether a sink is attached.
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Last percentage reported, if any.
    pub fn last_percent(&self) -> Option<u8> {
        self.last
    }

    /// Report `current` of `total` bytes.
    pub fn report(&mut self, current: u64, total: u64) {
        self.emit(percent(current, total));
    }

    /// Report completion.
    pub fn complete(&mut self) {
        self.emit(100);
    }

    fn emit(&mut self, pct: u8) {
        if self.last == Some(pct) {
            return;
        }
        self.last = Some(pct);
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let result = writeln!(sink, "Progress : {}", pct).and_then(|_| sink.flush());
        if let Err(e) = result {
            warn!(error = %e, percent = pct, "Failed to write progress");
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("enabled", &self.is_enabled())
            .field("last", &self.last)
            .finish()
    }
}
