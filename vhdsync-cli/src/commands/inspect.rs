//! `vhdsync inspect` - print the contents of a `.synchash` file.

use std::path::PathBuf;

use chrono::DateTime;
use clap::Args;
use vhdsync::synchash::SynchashFile;

use crate::error::CliError;

/// Arguments for the inspect command.
#[derive(Debug, Clone, Args)]
pub struct InspectArgs {
    /// Fingerprint file to read
    pub file: PathBuf,

    /// Also list every block record
    #[arg(long)]
    pub blocks: bool,
}

/// Run the inspect command.
pub fn run(args: InspectArgs) -> Result<(), CliError> {
    let mut file = SynchashFile::open(&args.file)?;
    let header = file.header().clone();

    println!("File:        {}", args.file.display());
    println!("Version:     {}", header.version);
    println!("Source:      {}", header.source_name);
    println!("Length:      {} bytes", header.file_length);
    println!("Generated:   {}", format_timestamp(header.timestamp));
    println!("Block size:  {} bytes", header.block_size);
    println!("Hash:        {}", header.hash_algorithm);
    println!("Blocks:      {}", header.block_count());
    match header.file_digest {
        Some(digest) => println!("File digest: {}", digest),
        None => println!("File digest: (none)"),
    }

    if args.blocks {
        println!();
        println!("{:>8}  {:>14}  {:>8}  strong", "block", "offset", "rolling");
        for (index, block) in file.blocks()?.iter().enumerate() {
            let (start, _) = header.block_range(index as u64);
            println!(
                "{:>8}  {:>14}  {}  {}",
                index, start, block.rolling, block.strong
            );
        }
    }

    Ok(())
}

fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("{} (out of range)", secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_timestamp(1_700_000_000), "2023-11-14 22:13:20 UTC");
        assert!(format_timestamp(u64::MAX).contains("out of range"));
    }
}
