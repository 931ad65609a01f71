//! `.synchash` block fingerprints.
//!
//! A fingerprint file records, for each fixed-size block of a disk image,
//! a weak rolling checksum and a strong digest. A peer holding an older copy
//! of the image can use it to find blocks it already has.
//!
//! - [`generate`] writes a fingerprint for a local file
//! - [`SynchashFile`] reads one back

mod error;
mod format;
mod generator;

pub use error::{SynchashError, SynchashResult};
pub use format::{
    record_size, BlockFingerprint, SynchashFile, SynchashHeader, SynchashVersion, HEADER_SIZE,
    MAX_SOURCE_NAME_LEN, SOURCE_NAME_CAPACITY, SYNCHASH_EXTENSION,
};
pub use generator::{generate, synchash_path, SynchashReport, DEFAULT_BLOCK_SIZE};
