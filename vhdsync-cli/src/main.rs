//! vhdsync CLI - Command-line interface
//!
//! Downloads disk images with resume support and writes block fingerprints
//! for delta synchronization.
//!
//! Exit status is 0 on success (including an image that was already
//! downloaded), 1 on any error and 2 on invalid usage.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::debug;
use vhdsync::config::ConfigFile;
use vhdsync::diagnostics::DiagnosticLog;
use vhdsync::logging::{init_logging, LogConfig};

use commands::download::DownloadArgs;
use commands::inspect::InspectArgs;
use commands::synchash::SynchashArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "vhdsync")]
#[command(version, about = "Resumable disk image download and block fingerprinting")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    /// Configuration file (default: <config dir>/vhdsync/config.ini)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Action,
}

#[derive(Debug, Subcommand)]
enum Action {
    /// Download an image over HTTP, resuming a previous partial download
    Download(DownloadArgs),
    /// Write a .synchash block fingerprint for a local image
    Synchash(SynchashArgs),
    /// Print the header and optionally the blocks of a .synchash file
    Inspect(InspectArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut diagnostics = DiagnosticLog::new();

    let result = run(cli);
    if let Err(e) = &result {
        diagnostics.record_error_chain(e);
    }

    if !diagnostics.is_empty() {
        let _ = diagnostics.flush_to(&mut std::io::stderr().lock());
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut log_config = LogConfig::new(cli.verbose);
    if let Some(path) = cli.log_file {
        log_config = log_config.with_log_file(path);
    }
    let _guard = init_logging(log_config).map_err(CliError::Logging)?;

    let config = ConfigFile::load(cli.config.as_deref())?;
    debug!(?config, "Effective configuration");

    match cli.command {
        Action::Download(args) => commands::download::run(args, &config).map(|_| ()),
        Action::Synchash(args) => commands::synchash::run(args, &config).map(|_| ()),
        Action::Inspect(args) => commands::inspect::run(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_download_defaults() {
        let cli = Cli::try_parse_from([
            "vhdsync",
            "download",
            "--url",
            "https://example.com/disk.vhd",
            "--uuid",
            "disk.vhd",
        ])
        .unwrap();
        let Action::Download(args) = cli.command else {
            panic!("expected download");
        };
        assert_eq!(args.path, PathBuf::from("."));
        assert_eq!(args.progress_fd, 0);
        assert_eq!(args.connection_fd, None);
        assert_eq!(args.chunk_size, None);
    }

    #[test]
    fn test_download_requires_url_and_image() {
        let err = Cli::try_parse_from(["vhdsync", "download", "--uuid", "x"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_synchash_arguments() {
        let cli = Cli::try_parse_from([
            "vhdsync",
            "-vv",
            "synchash",
            "disk.vhd",
            "--block-size",
            "4096",
            "--hash",
            "md5",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Action::Synchash(args) = cli.command else {
            panic!("expected synchash");
        };
        assert_eq!(args.input, PathBuf::from("disk.vhd"));
        assert_eq!(args.output_dir, PathBuf::from("."));
        assert_eq!(args.block_size, Some(4096));
        assert_eq!(args.hash, Some(commands::common::HashArg::Md5));
    }

    #[test]
    fn test_unknown_hash_is_usage_error() {
        let err =
            Cli::try_parse_from(["vhdsync", "synchash", "x", "--hash", "crc32"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_synchash_then_inspect() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("img.vhd");
        std::fs::write(&input, vec![3u8; 100]).unwrap();

        let args = SynchashArgs {
            input: input.clone(),
            output_dir: dir.path().to_path_buf(),
            block_size: Some(32),
            hash: None,
        };
        let report = commands::synchash::run(args, &ConfigFile::default()).unwrap();
        assert_eq!(report.block_count, 4);

        let inspect = InspectArgs {
            file: report.output_path,
            blocks: true,
        };
        commands::inspect::run(inspect).unwrap();
    }

    #[test]
    fn test_download_error_kind_flows_through() {
        let dir = tempfile::TempDir::new().unwrap();
        let args = DownloadArgs {
            url: "http://127.0.0.1:9/disk.vhd".to_string(),
            image: "disk.vhd".to_string(),
            path: dir.path().join("missing"),
            progress_fd: 0,
            connection_fd: None,
            cacert: None,
            capath: None,
            credentials: None,
            chunk_size: None,
            timeout: None,
        };
        let err = commands::download::run(args, &ConfigFile::default()).unwrap_err();
        assert_eq!(err.kind(), vhdsync::ErrorKind::Config);
    }
}
