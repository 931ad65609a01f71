//! Fingerprint generation for local disk images.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};

use super::error::{SynchashError, SynchashResult};
use super::format::{BlockFingerprint, SynchashHeader, SYNCHASH_EXTENSION};
use crate::checksum::{HashAlgorithm, StrongDigest};

/// Default block size for fingerprints (2 MiB, the VHD data block size).
pub const DEFAULT_BLOCK_SIZE: u32 = 2 * 1024 * 1024;

/// Summary of a completed generation.
#[derive(Debug, Clone)]
pub struct SynchashReport {
    /// Final location of the fingerprint file.
    pub output_path: PathBuf,
    /// Header as written, including the whole-file digest.
    pub header: SynchashHeader,
    /// Number of block records written.
    pub block_count: u64,
}

/// Path of the fingerprint for `input` inside `output_dir`.
pub fn synchash_path(input: &Path, output_dir: &Path) -> SynchashResult<PathBuf> {
    let name = input
        .file_name()
        .ok_or_else(|| SynchashError::MissingFileName(input.to_path_buf()))?;
    let mut file_name = name.to_os_string();
    file_name.push(".");
    file_name.push(SYNCHASH_EXTENSION);
    Ok(output_dir.join(file_name))
}

/// Fingerprint `input` block by block and write `<output_dir>/<name>.synchash`.
///
/// The output is staged in a temporary file in `output_dir` and moved into
/// place only once every record and the whole-file digest are written, so a
/// failed run never leaves a truncated fingerprint under the final name.
///
/// # Errors
///
/// Returns an error if the block size is zero, the input name does not fit
/// the header, the input cannot be read, or the output cannot be written.
pub fn generate(
    input: &Path,
    output_dir: &Path,
    block_size: u32,
    algorithm: HashAlgorithm,
) -> SynchashResult<SynchashReport> {
    if block_size == 0 {
        return Err(SynchashError::InvalidBlockSize(block_size));
    }

    let output_path = synchash_path(input, output_dir)?;
    let source_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| SynchashError::MissingFileName(input.to_path_buf()))?;

    let read_err = |source| SynchashError::ReadInput {
        path: input.to_path_buf(),
        source,
    };

    let mut source = File::open(input).map_err(|source| SynchashError::OpenInput {
        path: input.to_path_buf(),
        source,
    })?;
    let file_length = source.seek(SeekFrom::End(0)).map_err(read_err)?;
    source.seek(SeekFrom::Start(0)).map_err(read_err)?;

    let timestamp = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
    let mut header = SynchashHeader::new(source_name, file_length, timestamp, block_size, algorithm)?;
    let expected_blocks = header.block_count();

    info!(
        input = %input.display(),
        output = %output_path.display(),
        file_length,
        block_size,
        algorithm = %algorithm,
        blocks = expected_blocks,
        "Generating fingerprint"
    );
    let started = Instant::now();

    let write_err = |source| SynchashError::WriteOutput {
        path: output_path.clone(),
        source,
    };

    let staging = tempfile::Builder::new()
        .prefix(".synchash-")
        .tempfile_in(output_dir)
        .map_err(|source| SynchashError::CreateOutput {
            path: output_dir.to_path_buf(),
            source,
        })?;

    let mut writer = BufWriter::new(staging);
    writer.write_all(&header.encode()?).map_err(write_err)?;

    let mut reader = BufReader::new(source);
    let (written, file_digest) =
        write_records(&mut reader, &mut writer, &header, input, &output_path)?;
    debug!(digest = %file_digest, "Whole-file digest");
    header.file_digest = Some(file_digest);

    let mut staging = writer
        .into_inner()
        .map_err(|e| write_err(e.into_error()))?;
    staging
        .as_file_mut()
        .seek(SeekFrom::Start(0))
        .map_err(write_err)?;
    staging
        .as_file_mut()
        .write_all(&header.encode()?)
        .map_err(write_err)?;
    staging.as_file().sync_all().map_err(write_err)?;

    staging
        .persist(&output_path)
        .map_err(|e| SynchashError::Persist {
            path: output_path.clone(),
            source: e.error,
        })?;

    info!(
        output = %output_path.display(),
        blocks = written,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Fingerprint written"
    );

    Ok(SynchashReport {
        output_path,
        header,
        block_count: written,
    })
}

/// Hash exactly `header.file_length` bytes of `reader` into block records.
///
/// Fails with [`SynchashError::InputChanged`] if the input ends early or
/// still has bytes past the recorded length.
fn write_records<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    header: &SynchashHeader,
    input: &Path,
    output_path: &Path,
) -> SynchashResult<(u64, StrongDigest)> {
    let read_err = |source| SynchashError::ReadInput {
        path: input.to_path_buf(),
        source,
    };
    let changed = |actual| SynchashError::InputChanged {
        path: input.to_path_buf(),
        expected: header.file_length,
        actual,
    };

    let algorithm = header.hash_algorithm;
    let mut limited = reader.by_ref().take(header.file_length);
    let mut whole_file = algorithm.hasher();
    let mut block = Vec::with_capacity(header.block_size as usize);
    let mut written = 0u64;
    let mut bytes = 0u64;

    loop {
        block.clear();
        let n = limited
            .by_ref()
            .take(u64::from(header.block_size))
            .read_to_end(&mut block)
            .map_err(read_err)?;
        if n == 0 {
            break;
        }

        BlockFingerprint::compute(&block, algorithm)
            .write_to(writer)
            .map_err(|source| SynchashError::WriteOutput {
                path: output_path.to_path_buf(),
                source,
            })?;
        whole_file.update(&block);
        written += 1;
        bytes += n as u64;
    }

    if bytes != header.file_length {
        return Err(changed(bytes));
    }
    let trailing = io::copy(reader, &mut io::sink()).map_err(read_err)?;
    if trailing > 0 {
        return Err(changed(bytes + trailing));
    }

    debug_assert_eq!(written, header.block_count());
    Ok((written, whole_file.finalize()))
}
