//! Strong digests used to confirm weak checksum matches.

use std::fmt;
use std::str::FromStr;

use digest::Digest;
use md5::Md5;
use sha1::Sha1;
use sha2::Sha256;

/// Largest digest any supported algorithm produces.
pub const MAX_DIGEST_LEN: usize = 32;

/// Strong hash algorithm recorded in a fingerprint header.
///
/// The numeric wire values are part of the `.synchash` format and must not
/// be reordered.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum HashAlgorithm {
    /// SHA-1, 20-byte digests.
    #[default]
    Sha1,
    /// MD5, 16-byte digests.
    Md5,
    /// SHA-256, 32-byte digests.
    Sha256,
}

impl HashAlgorithm {
    /// All supported algorithms, in wire order.
    pub const ALL: [HashAlgorithm; 3] = [Self::Sha1, Self::Md5, Self::Sha256];

    /// Digest width in bytes.
    pub const fn digest_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Md5 => 16,
            Self::Sha256 => 32,
        }
    }

    /// Value stored in the header's `hash_algorithm` field.
    pub const fn wire_value(self) -> u32 {
        match self {
            Self::Sha1 => 0,
            Self::Md5 => 1,
            Self::Sha256 => 2,
        }
    }

    /// Decode a header `hash_algorithm` field.
    pub const fn from_wire(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Sha1),
            1 => Some(Self::Md5),
            2 => Some(Self::Sha256),
            _ => None,
        }
    }

    /// Lowercase name used on the command line and in config files.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
        }
    }

    /// Start an incremental hasher for this algorithm.
    pub fn hasher(self) -> StrongHasher {
        match self {
            Self::Sha1 => StrongHasher::Sha1(Sha1::new()),
            Self::Md5 => StrongHasher::Md5(Md5::new()),
            Self::Sha256 => StrongHasher::Sha256(Sha256::new()),
        }
    }

    /// Digest a complete buffer.
    pub fn digest(self, data: &[u8]) -> StrongDigest {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown algorithm name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown hash algorithm '{0}' (expected sha1, md5 or sha256)")]
pub struct UnknownHashAlgorithm(pub String);

impl FromStr for HashAlgorithm {
    type Err = UnknownHashAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha1" | "sha-1" => Ok(Self::Sha1),
            "md5" => Ok(Self::Md5),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            other => Err(UnknownHashAlgorithm(other.to_string())),
        }
    }
}

/// Incremental strong hasher, dispatched on the selected algorithm.
#[derive(Clone)]
pub enum StrongHasher {
    Sha1(Sha1),
    Md5(Md5),
    Sha256(Sha256),
}

impl StrongHasher {
    /// Feed more bytes into the digest.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha1(h) => h.update(data),
            Self::Md5(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
        }
    }

    /// The algorithm this hasher computes.
    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Sha1(_) => HashAlgorithm::Sha1,
            Self::Md5(_) => HashAlgorithm::Md5,
            Self::Sha256(_) => HashAlgorithm::Sha256,
        }
    }

    /// Consume the hasher and produce the digest.
    pub fn finalize(self) -> StrongDigest {
        match self {
            Self::Sha1(h) => StrongDigest::from_slice(&h.finalize()),
            Self::Md5(h) => StrongDigest::from_slice(&h.finalize()),
            Self::Sha256(h) => StrongDigest::from_slice(&h.finalize()),
        }
    }
}

impl fmt::Debug for StrongHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StrongHasher")
            .field(&self.algorithm())
            .finish()
    }
}

/// Fixed-capacity digest bytes; the used width depends on the algorithm.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrongDigest {
    bytes: [u8; MAX_DIGEST_LEN],
    len: u8,
}

impl StrongDigest {
    /// Copy a digest out of a slice.
    ///
    /// Slices longer than [`MAX_DIGEST_LEN`] are truncated.
    pub fn from_slice(slice: &[u8]) -> Self {
        let len = slice.len().min(MAX_DIGEST_LEN);
        let mut bytes = [0u8; MAX_DIGEST_LEN];
        bytes[..len].copy_from_slice(&slice[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }

    /// Digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Digest width in bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// True for a zero-width digest.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl AsRef<[u8]> for StrongDigest {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Display for StrongDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for StrongDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StrongDigest({})", self.to_hex())
    }
}
