// crates/warden-core/src/core/hashing.rs
// ============================================================================
// Module: Warden Canonical Hashing
// Description: Canonical JSON serialization and digest helpers.
// Purpose: Content-address frozen plans, checkpoints, and request payloads.
// Dependencies: serde, serde_jcs, sha2, thiserror
// ============================================================================

//! ## Overview
//! Frozen decision plans and idempotency records are content-addressed. This
//! module produces canonical JSON bytes (RFC 8785 JCS) and hashes them with a
//! pinned algorithm so a digest computed today matches a digest recomputed
//! during replay. Digests serialize on the wire as `sha256:<lowercase hex>`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde::Serializer;
use serde::de;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default hash algorithm for all Warden digests.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Canonicalization and hashing errors.
///
/// # Invariants
/// - Error messages never embed raw payload bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashError {
    /// Canonical JSON serialization failed.
    #[error("canonical json serialization failed: {0}")]
    Canonicalize(String),
    /// Digest string could not be parsed.
    #[error("invalid digest encoding: {0}")]
    InvalidEncoding(String),
    /// Digest names an unsupported algorithm.
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

// ============================================================================
// SECTION: Algorithm
// ============================================================================

/// Supported digest algorithms.
///
/// # Invariants
/// - Labels are stable wire identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256.
    Sha256,
}

impl HashAlgorithm {
    /// Returns the stable wire label for the algorithm.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }

    /// Parses an algorithm from its wire label.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::UnsupportedAlgorithm`] for unknown labels.
    pub fn parse(label: &str) -> Result<Self, HashError> {
        match label {
            "sha256" => Ok(Self::Sha256),
            other => Err(HashError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

// ============================================================================
// SECTION: Digest
// ============================================================================

/// A computed digest with its algorithm.
///
/// # Invariants
/// - `value` is lowercase hex of the raw digest bytes.
/// - Serializes as the single string `"<label>:<hex>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashDigest {
    /// Algorithm that produced the digest.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest value.
    pub value: String,
}

impl HashDigest {
    /// Parses a digest from its `"<label>:<hex>"` wire form.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the separator is missing, the algorithm is
    /// unknown, or the hex payload is malformed.
    pub fn parse(encoded: &str) -> Result<Self, HashError> {
        let (label, hex) = encoded
            .split_once(':')
            .ok_or_else(|| HashError::InvalidEncoding(encoded.to_string()))?;
        let algorithm = HashAlgorithm::parse(label)?;
        if hex.is_empty() || !hex.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return Err(HashError::InvalidEncoding(encoded.to_string()));
        }
        Ok(Self {
            algorithm,
            value: hex.to_ascii_lowercase(),
        })
    }
}

impl fmt::Display for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.label(), self.value)
    }
}

impl Serialize for HashDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HashDigest {
    fn deserialize<D: de::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::parse(&encoded).map_err(de::Error::custom)
    }
}

// ============================================================================
// SECTION: Hash Functions
// ============================================================================

/// Serializes a value to canonical JSON bytes (RFC 8785 JCS).
///
/// # Errors
///
/// Returns [`HashError::Canonicalize`] when the value cannot be represented
/// as canonical JSON.
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalize(err.to_string()))
}

/// Hashes raw bytes with the given algorithm.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let digest = Sha256::digest(bytes);
            let mut value = String::with_capacity(digest.len() * 2);
            for byte in digest {
                value.push_str(&format!("{byte:02x}"));
            }
            HashDigest {
                algorithm,
                value,
            }
        }
    }
}

/// Canonicalizes a value and hashes the canonical bytes.
///
/// # Errors
///
/// Returns [`HashError`] when canonical serialization fails.
pub fn hash_canonical_json<T: Serialize>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<HashDigest, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes(algorithm, &bytes))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions use unwraps for clarity."
    )]

    use serde_json::json;

    use super::*;

    #[test]
    fn digest_round_trips_through_wire_form() {
        let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, b"payload");
        let encoded = digest.to_string();
        assert!(encoded.starts_with("sha256:"));
        let parsed = HashDigest::parse(&encoded).unwrap();
        assert_eq!(parsed, digest);
    }

    #[test]
    fn canonical_bytes_are_key_order_independent() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        let hash_a = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &a).unwrap();
        let hash_b = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &b).unwrap();
        assert_eq!(hash_a, hash_b);
    }

    #[test]
    fn parse_rejects_missing_separator_and_bad_hex() {
        assert!(HashDigest::parse("sha256").is_err());
        assert!(HashDigest::parse("sha256:zz").is_err());
        assert!(HashDigest::parse("md5:abcd").is_err());
    }
}
