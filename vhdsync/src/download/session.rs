//! Resumable chunked download of a single image.
//!
//! Bytes are appended to `<name>.part` in the destination directory; the
//! length of that file is the only checkpoint. When every byte has arrived
//! the partial file is renamed to `<name>`, whose existence afterwards means
//! the image is fully downloaded.
//!
//! Concurrent sessions writing the same partial file are not coordinated.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::error::{DownloadError, DownloadResult};
use super::progress::ProgressReporter;
use super::state::SessionState;
use super::transport::{ByteRange, Transport, BUFFER_SIZE};

/// Default bytes per ranged request.
pub const DEFAULT_CHUNK_SIZE: u64 = 10_000_000;

/// Suffix of the in-progress file.
pub const PARTIAL_SUFFIX: &str = ".part";

/// What to download and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Remote URL of the image.
    pub url: String,
    /// Destination directory; must already exist.
    pub local_dir: PathBuf,
    /// File name of the image inside `local_dir`.
    pub local_name: String,
    /// Bytes per ranged request.
    pub chunk_size: u64,
}

impl SessionOptions {
    /// Options with the default chunk size.
    pub fn new(
        url: impl Into<String>,
        local_dir: impl Into<PathBuf>,
        local_name: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            local_dir: local_dir.into(),
            local_name: local_name.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the bytes per ranged request.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

/// Result of [`DownloadSession::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Every byte is in the partial file.
    Completed,
    /// The final file already exists; nothing was transferred.
    AlreadyExists,
}

/// Result of [`DownloadSession::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The image was downloaded (possibly resumed) and finalized.
    Downloaded,
    /// The final file already exists; nothing was transferred.
    AlreadyExists,
}

/// A single resumable download.
pub struct DownloadSession<T: Transport> {
    url: String,
    local_path: PathBuf,
    partial_path: PathBuf,
    chunk_size: u64,
    total_size: Option<u64>,
    start_offset: u64,
    current_offset: u64,
    transport: T,
    progress: ProgressReporter,
    state: SessionState,
    partial: Option<File>,
}

impl<T: Transport> DownloadSession<T> {
    /// Validate `options` and prepare a session.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the URL or image name is empty, the
    /// image name is not a plain file name, the destination directory does
    /// not exist, or the chunk size is zero.
    pub fn open(
        options: SessionOptions,
        transport: T,
        progress: ProgressReporter,
    ) -> DownloadResult<Self> {
        if options.url.trim().is_empty() {
            return Err(DownloadError::InvalidOption {
                option: "url",
                reason: "must not be empty".to_string(),
            });
        }
        if options.local_name.is_empty() {
            return Err(DownloadError::InvalidOption {
                option: "image name",
                reason: "must not be empty".to_string(),
            });
        }
        if !is_plain_file_name(&options.local_name) {
            return Err(DownloadError::InvalidImageName(options.local_name));
        }
        if options.chunk_size == 0 {
            return Err(DownloadError::InvalidChunkSize);
        }
        if !options.local_dir.is_dir() {
            return Err(DownloadError::DirectoryNotFound(options.local_dir));
        }

        let local_path = options.local_dir.join(&options.local_name);
        let partial_path = options
            .local_dir
            .join(format!("{}{}", options.local_name, PARTIAL_SUFFIX));

        debug!(
            url = %options.url,
            local = %local_path.display(),
            chunk_size = options.chunk_size,
            "Opened download session"
        );

        Ok(Self {
            url: options.url,
            local_path,
            partial_path,
            chunk_size: options.chunk_size,
            total_size: None,
            start_offset: 0,
            current_offset: 0,
            transport,
            progress,
            state: SessionState::Created,
            partial: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn partial_path(&self) -> &Path {
        &self.partial_path
    }

    /// Remote size, once discovered.
    pub fn total_size(&self) -> Option<u64> {
        self.total_size
    }

    /// Length of the partial file when the transfer started.
    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// Bytes of the image present in the partial file.
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    /// Consume the session, returning its transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Learn the remote size with a HEAD request.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the request fails or the response has no
    /// numeric `Content-Length`.
    pub fn discover_size(&mut self) -> DownloadResult<u64> {
        let result = self.discover_size_inner();
        self.track(result)
    }

    fn discover_size_inner(&mut self) -> DownloadResult<u64> {
        let info = self.transport.head(&self.url)?;
        let total = info
            .content_length
            .ok_or_else(|| DownloadError::MissingContentLength {
                url: self.url.clone(),
            })?;

        info!(url = %self.url, total_size = total, "Discovered remote size");
        self.total_size = Some(total);
        self.state = SessionState::SizeKnown;
        Ok(total)
    }

    /// Transfer every missing byte into the partial file.
    ///
    /// Resumes from the current length of the partial file. Bytes written
    /// before a failure stay on disk, so a later call continues from there.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the size has not been discovered,
    /// a transport error if a range fails or arrives short, and an I/O error
    /// if the partial file cannot be written or is longer than the remote
    /// image.
    pub fn start(&mut self) -> DownloadResult<StartOutcome> {
        let result = self.start_inner();
        self.track(result)
    }

    fn start_inner(&mut self) -> DownloadResult<StartOutcome> {
        if self.local_path.exists() {
            info!(path = %self.local_path.display(), "Image already present");
            self.state = SessionState::AlreadyExists;
            return Ok(StartOutcome::AlreadyExists);
        }
        let total = self.total_size.ok_or(DownloadError::SizeUnknown)?;

        let open_err = |source| DownloadError::OpenPartial {
            path: self.partial_path.clone(),
            source,
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.partial_path)
            .map_err(open_err)?;
        let existing = file.metadata().map_err(open_err)?.len();

        if existing > total {
            return Err(DownloadError::PartialTooLarge {
                path: self.partial_path.clone(),
                partial: existing,
                total,
            });
        }

        self.start_offset = existing;
        self.current_offset = existing;
        self.state = SessionState::Downloading;

        if existing > 0 {
            info!(
                path = %self.partial_path.display(),
                offset = existing,
                total_size = total,
                "Resuming download"
            );
        } else {
            info!(url = %self.url, total_size = total, "Starting download");
        }

        let file = self.partial.insert(file);

        while self.current_offset < total {
            let end = self
                .current_offset
                .saturating_add(self.chunk_size - 1)
                .min(total - 1);
            let range = ByteRange::new(self.current_offset, end);

            self.progress.report(self.current_offset, total);
            debug!(range = %range, "Fetching chunk");

            let mut writer = BufWriter::with_capacity(BUFFER_SIZE, &mut *file);
            let received = self.transport.get_range(&self.url, range, &mut writer)?;
            writer.flush().map_err(|source| DownloadError::WritePartial {
                path: self.partial_path.clone(),
                source,
            })?;
            drop(writer);

            if received != range.byte_count() {
                return Err(DownloadError::ShortRead {
                    url: self.url.clone(),
                    range: range.to_string(),
                    expected: range.byte_count(),
                    received,
                });
            }

            self.current_offset = end + 1;
        }

        self.state = SessionState::Completed;
        info!(
            bytes = self.current_offset - self.start_offset,
            total_size = total,
            "Transfer complete"
        );
        Ok(StartOutcome::Completed)
    }

    /// Move the completed partial file to its final name.
    ///
    /// # Errors
    ///
    /// Returns a configuration error unless [`start`](Self::start) returned
    /// [`StartOutcome::Completed`], and an I/O error if the rename fails.
    pub fn finalize(&mut self) -> DownloadResult<()> {
        let result = self.finalize_inner();
        self.track(result)
    }

    fn finalize_inner(&mut self) -> DownloadResult<()> {
        if self.state != SessionState::Completed {
            return Err(DownloadError::NotCompleted {
                state: self.state.to_string(),
            });
        }

        if let Some(file) = self.partial.take() {
            file.sync_all()
                .map_err(|source| DownloadError::WritePartial {
                    path: self.partial_path.clone(),
                    source,
                })?;
        }

        std::fs::rename(&self.partial_path, &self.local_path).map_err(|source| {
            DownloadError::Rename {
                from: self.partial_path.clone(),
                to: self.local_path.clone(),
                source,
            }
        })?;

        self.state = SessionState::Finalized;
        self.progress.complete();
        info!(path = %self.local_path.display(), "Download finalized");
        Ok(())
    }

    /// Run the whole download: existence check, size discovery, transfer and
    /// finalize.
    ///
    /// An existing final file short-circuits before any network request.
    pub fn run(&mut self) -> DownloadResult<DownloadOutcome> {
        if self.local_path.exists() {
            info!(path = %self.local_path.display(), "Image already present");
            self.state = SessionState::AlreadyExists;
            return Ok(DownloadOutcome::AlreadyExists);
        }

        self.discover_size()?;
        match self.start()? {
            StartOutcome::AlreadyExists => Ok(DownloadOutcome::AlreadyExists),
            StartOutcome::Completed => {
                self.finalize()?;
                Ok(DownloadOutcome::Downloaded)
            }
        }
    }

    fn track<R>(&mut self, result: DownloadResult<R>) -> DownloadResult<R> {
        if let Err(e) = &result {
            if self.state != SessionState::Failed {
                warn!(state = %self.state, error = %e, "Download step failed");
            }
            self.state = SessionState::Failed;
        }
        result
    }
}

impl<T: Transport> std::fmt::Debug for DownloadSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadSession")
            .field("url", &self.url)
            .field("local_path", &self.local_path)
            .field("chunk_size", &self.chunk_size)
            .field("total_size", &self.total_size)
            .field("current_offset", &self.current_offset)
            .field("state", &self.state)
            .finish()
    }
}

/// A single normal path component with no separators.
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(c)), None) if c == name
    ) && !name.contains(['/', '\\'])
}
