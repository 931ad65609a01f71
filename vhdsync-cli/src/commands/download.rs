//! `vhdsync download` - resumable image download.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use tracing::{info, warn};
use vhdsync::config::ConfigFile;
use vhdsync::download::{
    Credentials, DownloadOutcome, DownloadSession, HttpTransport, ProgressReporter,
    SessionOptions, Transport, TransportConfig,
};

use super::common::resolve;
use crate::error::CliError;

/// Arguments for the download command.
#[derive(Debug, Clone, Args)]
pub struct DownloadArgs {
    /// URL of the image to download
    #[arg(long)]
    pub url: String,

    /// Name of the image file to create in the destination directory
    #[arg(long = "uuid", value_name = "IMAGE")]
    pub image: String,

    /// Destination directory (must exist)
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub path: PathBuf,

    /// Inherited file descriptor to write progress lines to (0 = none)
    #[arg(long, value_name = "FD", default_value_t = 0)]
    pub progress_fd: i32,

    /// Inherited, already-connected socket to send requests over
    #[arg(long, value_name = "FD")]
    pub connection_fd: Option<i32>,

    /// PEM file with an additional trusted CA certificate
    #[arg(long, value_name = "FILE")]
    pub cacert: Option<PathBuf>,

    /// Directory of PEM files with additional trusted CA certificates
    #[arg(long, value_name = "DIR")]
    pub capath: Option<PathBuf>,

    /// Credentials for HTTP Digest authentication
    #[arg(long, value_name = "USER:PASS")]
    pub credentials: Option<String>,

    /// Bytes per ranged request
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

/// Run the download command.
pub fn run(args: DownloadArgs, config: &ConfigFile) -> Result<DownloadOutcome, CliError> {
    let settings = &config.download;
    let chunk_size = resolve(args.chunk_size, settings.chunk_size);
    let timeout = Duration::from_secs(resolve(args.timeout, settings.timeout_secs));

    if args.progress_fd < 0 {
        return Err(CliError::InvalidArgument(format!(
            "--progress-fd must not be negative (got {})",
            args.progress_fd
        )));
    }

    let transport: Box<dyn Transport> = match args.connection_fd {
        Some(fd) => {
            if args.cacert.is_some() || args.capath.is_some() || args.credentials.is_some() {
                warn!("TLS and credential options are ignored on a pre-connected socket");
            }
            connected_socket(fd)?
        }
        None => {
            let mut transport_config = TransportConfig::new().with_timeout(timeout);
            if let Some(path) = args.cacert.clone().or_else(|| settings.cacert.clone()) {
                transport_config = transport_config.with_ca_certificate(path);
            }
            if let Some(path) = args.capath.clone().or_else(|| settings.capath.clone()) {
                transport_config = transport_config.with_ca_path(path);
            }
            if let Some(raw) = &args.credentials {
                transport_config = transport_config.with_credentials(raw.parse::<Credentials>()?);
            }
            Box::new(HttpTransport::new(transport_config)?)
        }
    };

    let progress = progress_reporter(args.progress_fd)?;

    let options =
        SessionOptions::new(args.url, args.path, args.image).with_chunk_size(chunk_size);
    let mut session = DownloadSession::open(options, transport, progress)?;
    let outcome = session.run()?;

    match outcome {
        DownloadOutcome::Downloaded => {
            info!(path = %session.local_path().display(), "Download complete");
            println!("Downloaded {}", session.local_path().display());
        }
        DownloadOutcome::AlreadyExists => {
            println!("{} already exists", session.local_path().display());
        }
    }

    Ok(outcome)
}

#[cfg(unix)]
fn connected_socket(fd: i32) -> Result<Box<dyn Transport>, CliError> {
    use vhdsync::download::SocketTransport;

    if fd < 0 {
        return Err(CliError::InvalidArgument(format!(
            "--connection-fd must not be negative (got {})",
            fd
        )));
    }
    info!(fd, "Using pre-connected socket");
    // SAFETY: the descriptor is handed over by the parent process for our
    // exclusive use; nothing else in this process owns it.
    Ok(Box::new(unsafe { SocketTransport::from_raw_fd(fd) }))
}

#[cfg(not(unix))]
fn connected_socket(_fd: i32) -> Result<Box<dyn Transport>, CliError> {
    Err(CliError::InvalidArgument(
        "--connection-fd is only supported on Unix".to_string(),
    ))
}

#[cfg(unix)]
fn progress_reporter(fd: i32) -> Result<ProgressReporter, CliError> {
    // SAFETY: a non-zero descriptor is inherited from the parent process for
    // progress output and is not used elsewhere.
    Ok(unsafe { ProgressReporter::from_raw_fd(fd) })
}

#[cfg(not(unix))]
fn progress_reporter(fd: i32) -> Result<ProgressReporter, CliError> {
    if fd == 0 {
        Ok(ProgressReporter::none())
    } else {
        Err(CliError::InvalidArgument(
            "--progress-fd is only supported on Unix".to_string(),
        ))
    }
}
