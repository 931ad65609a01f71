//! Checksums used by block fingerprints.
//!
//! - `rolling`: cheap weak checksum, updatable one byte at a time
//! - `strong`: cryptographic digests (SHA-1, MD5, SHA-256)

mod rolling;
mod strong;

pub use rolling::{RollingChecksum, ROLLING_CHECKSUM_LEN};
pub use strong::{
    HashAlgorithm, StrongDigest, StrongHasher, UnknownHashAlgorithm, MAX_DIGEST_LEN,
};
