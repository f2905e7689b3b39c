use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::StorageError;

/// A validated SHA-256 content hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Compute the SHA-256 hash of the given data.
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Construct from raw SHA-256 bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a hex-encoded content hash string.
    pub fn from_hex(s: &str) -> Result<Self, StorageError> {
        if s.len() != 64 {
            return Err(StorageError::InvalidId(format!(
                "expected 64 hex characters, got {}",
                s.len()
            )));
        }

        let bytes =
            hex::decode(s).map_err(|e| StorageError::InvalidId(format!("invalid hex: {e}")))?;

        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| StorageError::InvalidId("decoded to wrong length".into()))?;

        Ok(Self(arr))
    }

    /// Return the hash as a 64-character lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Return the raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Owner-scoped content address: `{owner}-{sha256 hex}`.
///
/// Scoping by owner isolates tenants and deduplicates per owner; the same
/// content uploaded by two owners yields two distinct storage ids.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StorageId {
    owner: String,
    digest: ContentHash,
}

impl StorageId {
    pub fn new(owner: &str, digest: ContentHash) -> Self {
        Self {
            owner: owner.to_string(),
            digest,
        }
    }

    /// Parse a storage id string.
    ///
    /// The digest is the fixed-width tail, so owner identifiers may contain
    /// dashes themselves.
    pub fn parse(s: &str) -> Result<Self, StorageError> {
        let (owner, digest) = s
            .rsplit_once('-')
            .ok_or_else(|| StorageError::InvalidId(format!("missing owner prefix in '{s}'")))?;

        if owner.is_empty() {
            return Err(StorageError::InvalidId(format!("empty owner in '{s}'")));
        }

        Ok(Self {
            owner: owner.to_string(),
            digest: ContentHash::from_hex(digest)?,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn digest(&self) -> &ContentHash {
        &self.digest
    }

    /// Backend key for this object: `{owner}/{sha256 hex}`.
    ///
    /// Objects of one owner share a directory (or remote key prefix).
    pub fn key(&self) -> String {
        format!("{}/{}", self.owner, self.digest.to_hex())
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.owner, self.digest.to_hex())
    }
}

impl fmt::Debug for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageId({self})")
    }
}
