use std::fmt;

use sha2::{Digest, Sha384};

use crate::error::TypeError;

/// Digest algorithms understood by the record stream.
///
/// Only SHA-384 is in use; the numeric id is what gets written to disk in
/// front of every serialized hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DigestType {
    Sha384,
}

impl DigestType {
    /// Wire identifier of the algorithm.
    pub const fn id(self) -> i32 {
        match self {
            Self::Sha384 => 0x58ff_811b,
        }
    }

    /// Digest length in bytes.
    pub const fn length(self) -> usize {
        match self {
            Self::Sha384 => 48,
        }
    }

    /// Look up a digest type by its wire identifier.
    pub fn from_id(id: i32) -> Result<Self, TypeError> {
        match id {
            0x58ff_811b => Ok(Self::Sha384),
            other => Err(TypeError::UnknownDigestType(other)),
        }
    }
}

/// Length of every [`Hash`] in bytes.
pub const HASH_LENGTH: usize = DigestType::Sha384.length();

/// A SHA-384 digest.
///
/// Running hashes, entire-file hashes and metadata hashes all use this type.
/// Equal input bytes always produce the same `Hash`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; HASH_LENGTH]);

impl Hash {
    /// The node-wide digest algorithm.
    pub const DIGEST_TYPE: DigestType = DigestType::Sha384;

    /// Digest raw bytes.
    pub fn digest(data: &[u8]) -> Self {
        Self::from_digest_output(Sha384::digest(data))
    }

    /// Wrap the output of a finished SHA-384 hasher.
    pub fn from_digest_output(output: sha2::digest::Output<Sha384>) -> Self {
        let mut arr = [0u8; HASH_LENGTH];
        arr.copy_from_slice(output.as_slice());
        Self(arr)
    }

    /// Wrap a pre-computed digest.
    pub const fn from_hash(hash: [u8; HASH_LENGTH]) -> Self {
        Self(hash)
    }

    /// Build a hash from a byte slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; HASH_LENGTH] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: HASH_LENGTH,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// The all-zero hash.
    pub const fn null() -> Self {
        Self([0u8; HASH_LENGTH])
    }

    /// Returns `true` if every byte is zero.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; HASH_LENGTH]
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; HASH_LENGTH]> for Hash {
    fn from(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
