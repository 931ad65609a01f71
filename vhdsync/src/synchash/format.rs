//! Binary layout of `.synchash` fingerprint files.
//!
//! A fingerprint file is a fixed 1 KiB header followed by one fixed-size
//! record per block of the source file, with no delimiters:
//!
//! ```text
//! offset  size  field
//!      0     2  version.major           (u16, LE)
//!      2     2  version.minor           (u16, LE)
//!      4     4  reserved
//!      8   256  source name             (UTF-8, NUL padded)
//!    264     8  file length             (u64, LE)
//!    272     8  generation timestamp    (u64, LE, Unix seconds)
//!    280     4  block size              (u32, LE)
//!    284     4  hash algorithm          (u32, LE)
//!    288   224  reserved
//!    512   512  whole-file digest slot  (digest bytes, zero padded)
//!   1024     -  block records
//! ```
//!
//! Each block record is the rolling checksum (`a`, `b` as LE u16) followed
//! by the strong digest, so record `i` starts at
//! `HEADER_SIZE + i * record_size`. Reserved bytes are written as zero and
//! ignored when reading.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{SynchashError, SynchashResult};
use crate::checksum::{HashAlgorithm, RollingChecksum, StrongDigest, ROLLING_CHECKSUM_LEN};

/// File extension of fingerprint files (without the dot).
pub const SYNCHASH_EXTENSION: &str = "synchash";

/// Size of the header in bytes; identical across all format versions.
pub const HEADER_SIZE: usize = 1024;

/// Capacity of the source-name field, including the terminating NUL.
pub const SOURCE_NAME_CAPACITY: usize = 256;

/// Longest source name that fits the header.
pub const MAX_SOURCE_NAME_LEN: usize = SOURCE_NAME_CAPACITY - 1;

const OFFSET_MAJOR: usize = 0;
const OFFSET_MINOR: usize = 2;
const OFFSET_NAME: usize = 8;
const OFFSET_FILE_LENGTH: usize = 264;
const OFFSET_TIMESTAMP: usize = 272;
const OFFSET_BLOCK_SIZE: usize = 280;
const OFFSET_HASH: usize = 284;
const OFFSET_FILE_DIGEST: usize = 512;

/// Format revision stored at the start of every header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SynchashVersion {
    pub major: u16,
    pub minor: u16,
}

impl SynchashVersion {
    /// Revision written by this build.
    pub const CURRENT: SynchashVersion = SynchashVersion { major: 1, minor: 0 };

    /// Whether a reader of this build understands files of `self`.
    pub fn is_supported(&self) -> bool {
        self.major == Self::CURRENT.major
    }
}

impl std::fmt::Display for SynchashVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Fixed-size header of a fingerprint file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynchashHeader {
    pub version: SynchashVersion,
    /// Base name of the fingerprinted file.
    pub source_name: String,
    /// Length of the fingerprinted file in bytes.
    pub file_length: u64,
    /// Generation time, seconds since the Unix epoch (UTC).
    pub timestamp: u64,
    /// Bytes per block; every block but the last is exactly this long.
    pub block_size: u32,
    pub hash_algorithm: HashAlgorithm,
    /// Strong digest of the whole file, once known.
    pub file_digest: Option<StrongDigest>,
}

impl SynchashHeader {
    /// Create a header for the current format version.
    ///
    /// # Errors
    ///
    /// Fails if `block_size` is zero or `source_name` does not fit the header.
    pub fn new(
        source_name: impl Into<String>,
        file_length: u64,
        timestamp: u64,
        block_size: u32,
        hash_algorithm: HashAlgorithm,
    ) -> SynchashResult<Self> {
        let header = Self {
            version: SynchashVersion::CURRENT,
            source_name: source_name.into(),
            file_length,
            timestamp,
            block_size,
            hash_algorithm,
            file_digest: None,
        };
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> SynchashResult<()> {
        if self.block_size == 0 {
            return Err(SynchashError::InvalidBlockSize(self.block_size));
        }
        let len = self.source_name.len();
        if len > MAX_SOURCE_NAME_LEN || self.source_name.contains('\0') {
            return Err(SynchashError::SourceNameTooLong {
                name: self.source_name.clone(),
                len,
                max: MAX_SOURCE_NAME_LEN,
            });
        }
        Ok(())
    }

    /// Number of block records, `ceil(file_length / block_size)`.
    pub fn block_count(&self) -> u64 {
        self.file_length.div_ceil(u64::from(self.block_size))
    }

    /// Size of a single block record in bytes.
    pub fn record_size(&self) -> usize {
        record_size(self.hash_algorithm)
    }

    /// Byte offset of record `index` in the file.
    pub fn record_offset(&self, index: u64) -> u64 {
        HEADER_SIZE as u64 + index * self.record_size() as u64
    }

    /// Total length a well-formed file with this header must have.
    pub fn expected_file_len(&self) -> u64 {
        self.record_offset(self.block_count())
    }

    /// Byte range `[start, end)` of the source file covered by block `index`.
    pub fn block_range(&self, index: u64) -> (u64, u64) {
        let start = index * u64::from(self.block_size);
        let end = (start + u64::from(self.block_size)).min(self.file_length);
        (start, end)
    }

    /// Serialize into the fixed header layout.
    pub fn encode(&self) -> SynchashResult<[u8; HEADER_SIZE]> {
        self.validate()?;

        let mut buf = [0u8; HEADER_SIZE];
        buf[OFFSET_MAJOR..OFFSET_MAJOR + 2].copy_from_slice(&self.version.major.to_le_bytes());
        buf[OFFSET_MINOR..OFFSET_MINOR + 2].copy_from_slice(&self.version.minor.to_le_bytes());

        let name = self.source_name.as_bytes();
        buf[OFFSET_NAME..OFFSET_NAME + name.len()].copy_from_slice(name);

        buf[OFFSET_FILE_LENGTH..OFFSET_FILE_LENGTH + 8]
            .copy_from_slice(&self.file_length.to_le_bytes());
        buf[OFFSET_TIMESTAMP..OFFSET_TIMESTAMP + 8].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[OFFSET_BLOCK_SIZE..OFFSET_BLOCK_SIZE + 4]
            .copy_from_slice(&self.block_size.to_le_bytes());
        buf[OFFSET_HASH..OFFSET_HASH + 4]
            .copy_from_slice(&self.hash_algorithm.wire_value().to_le_bytes());

        if let Some(digest) = &self.file_digest {
            let bytes = digest.as_bytes();
            buf[OFFSET_FILE_DIGEST..OFFSET_FILE_DIGEST + bytes.len()].copy_from_slice(bytes);
        }

        Ok(buf)
    }

    /// Parse a header from its fixed layout.
    ///
    /// # Errors
    ///
    /// Fails on an unsupported major version, an unknown hash algorithm, a
    /// zero block size or a source name that is not valid UTF-8.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> SynchashResult<Self> {
        let version = SynchashVersion {
            major: read_u16(buf, OFFSET_MAJOR),
            minor: read_u16(buf, OFFSET_MINOR),
        };
        if !version.is_supported() {
            return Err(SynchashError::UnsupportedVersion {
                major: version.major,
                minor: version.minor,
            });
        }

        let name_field = &buf[OFFSET_NAME..OFFSET_NAME + SOURCE_NAME_CAPACITY];
        let name_len = name_field
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| SynchashError::InvalidHeader("source name is not terminated".into()))?;
        let source_name = std::str::from_utf8(&name_field[..name_len])
            .map_err(|_| SynchashError::InvalidHeader("source name is not valid UTF-8".into()))?
            .to_string();

        let hash_id = read_u32(buf, OFFSET_HASH);
        let hash_algorithm =
            HashAlgorithm::from_wire(hash_id).ok_or(SynchashError::UnknownHashAlgorithm(hash_id))?;

        let block_size = read_u32(buf, OFFSET_BLOCK_SIZE);
        if block_size == 0 {
            return Err(SynchashError::InvalidHeader("block size is zero".into()));
        }

        let digest_slot =
            &buf[OFFSET_FILE_DIGEST..OFFSET_FILE_DIGEST + hash_algorithm.digest_len()];
        let file_digest = digest_slot
            .iter()
            .any(|&b| b != 0)
            .then(|| StrongDigest::from_slice(digest_slot));

        Ok(Self {
            version,
            source_name,
            file_length: read_u64(buf, OFFSET_FILE_LENGTH),
            timestamp: read_u64(buf, OFFSET_TIMESTAMP),
            block_size,
            hash_algorithm,
            file_digest,
        })
    }
}

/// Size of one block record for `algorithm`.
pub fn record_size(algorithm: HashAlgorithm) -> usize {
    ROLLING_CHECKSUM_LEN + algorithm.digest_len()
}

/// Fingerprint of a single block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFingerprint {
    pub rolling: RollingChecksum,
    pub strong: StrongDigest,
}

impl BlockFingerprint {
    /// Fingerprint `data` with the weak checksum and `algorithm`.
    pub fn compute(data: &[u8], algorithm: HashAlgorithm) -> Self {
        Self {
            rolling: RollingChecksum::compute(data),
            strong: algorithm.digest(data),
        }
    }

    /// Append the record encoding to `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.rolling.to_le_bytes())?;
        writer.write_all(self.strong.as_bytes())
    }

    /// Parse one record; `bytes` must be exactly `record_size(algorithm)` long.
    pub fn decode(bytes: &[u8], algorithm: HashAlgorithm) -> SynchashResult<Self> {
        if bytes.len() != record_size(algorithm) {
            return Err(SynchashError::InvalidHeader(format!(
                "block record is {} bytes, expected {}",
                bytes.len(),
                record_size(algorithm)
            )));
        }
        let rolling = RollingChecksum::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Ok(Self {
            rolling,
            strong: StrongDigest::from_slice(&bytes[ROLLING_CHECKSUM_LEN..]),
        })
    }
}

/// Read access to an existing fingerprint file.
#[derive(Debug)]
pub struct SynchashFile {
    path: PathBuf,
    file: File,
    header: SynchashHeader,
}

impl SynchashFile {
    /// Open a fingerprint file and validate its header and length.
    pub fn open(path: &Path) -> SynchashResult<Self> {
        let read_err = |source| SynchashError::ReadFingerprint {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(read_err)?;
        let mut buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut buf).map_err(read_err)?;
        let header = SynchashHeader::decode(&buf)?;

        let actual = file.metadata().map_err(read_err)?.len();
        let expected = header.expected_file_len();
        if actual != expected {
            return Err(SynchashError::LengthMismatch {
                path: path.to_path_buf(),
                expected,
                actual,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            header,
        })
    }

    pub fn header(&self) -> &SynchashHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of block records in the file.
    pub fn block_count(&self) -> u64 {
        self.header.block_count()
    }

    /// Read the record for block `index`.
    pub fn block(&mut self, index: u64) -> SynchashResult<BlockFingerprint> {
        let count = self.block_count();
        if index >= count {
            return Err(SynchashError::BlockOutOfRange { index, count });
        }

        let mut record = vec![0u8; self.header.record_size()];
        self.file
            .seek(SeekFrom::Start(self.header.record_offset(index)))
            .and_then(|_| self.file.read_exact(&mut record))
            .map_err(|source| SynchashError::ReadFingerprint {
                path: self.path.clone(),
                source,
            })?;

        BlockFingerprint::decode(&record, self.header.hash_algorithm)
    }

    /// Read every record in file order.
    pub fn blocks(&mut self) -> SynchashResult<Vec<BlockFingerprint>> {
        let read_err = |source| SynchashError::ReadFingerprint {
            path: self.path.clone(),
            source,
        };

        self.file
            .seek(SeekFrom::Start(HEADER_SIZE as u64))
            .map_err(read_err)?;

        let algorithm = self.header.hash_algorithm;
        let mut reader = BufReader::new(&self.file);
        let mut record = vec![0u8; self.header.record_size()];
        let mut blocks = Vec::with_capacity(self.block_count() as usize);

        for _ in 0..self.block_count() {
            reader.read_exact(&mut record).map_err(read_err)?;
            blocks.push(BlockFingerprint::decode(&record, algorithm)?);
        }

        Ok(blocks)
    }
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}
