//! `vhdsync synchash` - write a block fingerprint for a local image.

use std::path::PathBuf;

use clap::Args;
use vhdsync::checksum::HashAlgorithm;
use vhdsync::config::ConfigFile;
use vhdsync::synchash::{self, SynchashReport};

use super::common::{resolve, HashArg};
use crate::error::CliError;

/// Arguments for the synchash command.
#[derive(Debug, Clone, Args)]
pub struct SynchashArgs {
    /// Image to fingerprint
    pub input: PathBuf,

    /// Directory to write `<name>.synchash` into
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Bytes per block
    #[arg(long, value_name = "BYTES")]
    pub block_size: Option<u32>,

    /// Strong hash for each block
    #[arg(long, value_enum)]
    pub hash: Option<HashArg>,
}

/// Run the synchash command.
pub fn run(args: SynchashArgs, config: &ConfigFile) -> Result<SynchashReport, CliError> {
    let block_size = resolve(args.block_size, config.synchash.block_size);
    let algorithm = resolve(args.hash.map(HashAlgorithm::from), config.synchash.hash);

    let report = synchash::generate(&args.input, &args.output_dir, block_size, algorithm)?;

    println!(
        "Wrote {} ({} blocks of {} bytes, {})",
        report.output_path.display(),
        report.block_count,
        block_size,
        algorithm
    );
    Ok(report)
}
