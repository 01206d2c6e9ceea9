#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Algorithm-tagged digests for artifact verification
//!
//! Recipes declare either a sha256 or a blake3 checksum; verification must
//! complete before any build phase runs, so everything here is written to
//! be usable while an artifact is still streaming in.

use kiln_errors::{Error, NetworkError, RecipeError};
use kiln_types::Checksum;
use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use std::fmt;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Size of chunks for streaming hash computation
const CHUNK_SIZE: usize = 64 * 1024; // 64KB

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Sha256,
    Blake3,
}

impl Algorithm {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Blake3 => "blake3",
        }
    }
}

/// A digest value tagged with the algorithm that produced it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: Algorithm,
    bytes: [u8; 32],
}

impl Digest {
    /// Create a digest from raw bytes
    #[must_use]
    pub fn from_bytes(algorithm: Algorithm, bytes: [u8; 32]) -> Self {
        Self { algorithm, bytes }
    }

    /// Parse from a hex string
    ///
    /// # Errors
    /// Returns an error if the input is not exactly 64 hex characters.
    pub fn from_hex(algorithm: Algorithm, s: &str) -> Result<Self, Error> {
        let bytes = hex::decode(s).map_err(|e| RecipeError::InvalidChecksum {
            message: format!("invalid hex: {e}"),
        })?;

        if bytes.len() != 32 {
            return Err(RecipeError::InvalidChecksum {
                message: format!("digest must be 32 bytes, got {}", bytes.len()),
            }
            .into());
        }

        let mut array = [0u8; 32];
        array.copy_from_slice(&bytes);
        Ok(Self::from_bytes(algorithm, array))
    }

    /// Build a digest from a recipe's declared checksum
    ///
    /// # Errors
    /// Returns an error if the hex string is malformed.
    pub fn from_checksum(checksum: &Checksum) -> Result<Self, Error> {
        match checksum {
            Checksum::Sha256(hex) => Self::from_hex(Algorithm::Sha256, hex),
            Checksum::Blake3(hex) => Self::from_hex(Algorithm::Blake3, hex),
        }
    }

    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Algorithm-prefixed form, e.g. `sha256:5462f7bb...`
    #[must_use]
    pub fn tagged(&self) -> String {
        format!("{}:{}", self.algorithm.name(), self.to_hex())
    }

    /// Compute the digest of a byte slice
    #[must_use]
    pub fn of_data(algorithm: Algorithm, data: &[u8]) -> Self {
        let mut hasher = StreamingHasher::new(algorithm);
        hasher.update(data);
        hasher.finalize()
    }

    /// Compute the digest of a file by streaming it in chunks
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or read.
    pub async fn hash_file(algorithm: Algorithm, path: &Path) -> Result<Self, Error> {
        let mut file = File::open(path)
            .await
            .map_err(|e| Error::io_with_path(&e, path))?;

        let mut hasher = StreamingHasher::new(algorithm);
        let mut buffer = vec![0; CHUNK_SIZE];

        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(hasher.finalize())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tagged())
    }
}

/// Incremental hasher used while data is still streaming in
pub enum StreamingHasher {
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl StreamingHasher {
    #[must_use]
    pub fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Sha256 => Self::Sha256(sha2::Sha256::new()),
            Algorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(hasher) => hasher.update(data),
            Self::Blake3(hasher) => {
                hasher.update(data);
            }
        }
    }

    #[must_use]
    pub fn finalize(self) -> Digest {
        match self {
            Self::Sha256(hasher) => {
                let bytes: [u8; 32] = hasher.finalize().into();
                Digest::from_bytes(Algorithm::Sha256, bytes)
            }
            Self::Blake3(hasher) => {
                Digest::from_bytes(Algorithm::Blake3, *hasher.finalize().as_bytes())
            }
        }
    }
}

/// Verify a file against an expected digest
///
/// # Errors
/// Returns `ChecksumMismatch` when the digests differ, or an I/O error if
/// the file cannot be read.
pub async fn verify_file(path: &Path, expected: &Digest) -> Result<(), Error> {
    let actual = Digest::hash_file(expected.algorithm(), path).await?;
    if actual == *expected {
        Ok(())
    } else {
        Err(NetworkError::ChecksumMismatch {
            expected: expected.tagged(),
            actual: actual.tagged(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_matches_known_vector() {
        // sha256 of "hello world"
        let digest = Digest::of_data(Algorithm::Sha256, b"hello world");
        assert_eq!(
            digest.to_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert!(digest.tagged().starts_with("sha256:"));
    }

    #[test]
    fn blake3_matches_known_vector() {
        // blake3 of "hello world"
        let digest = Digest::of_data(Algorithm::Blake3, b"hello world");
        assert_eq!(
            digest.to_hex(),
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
        );
    }

    #[test]
    fn hex_round_trip() {
        let digest = Digest::of_data(Algorithm::Sha256, b"test");
        let parsed = Digest::from_hex(Algorithm::Sha256, &digest.to_hex()).unwrap();
        assert_eq!(digest, parsed);
    }

    #[test]
    fn rejects_truncated_hex() {
        assert!(Digest::from_hex(Algorithm::Sha256, "abcd").is_err());
        assert!(Digest::from_hex(Algorithm::Sha256, "zz".repeat(32).as_str()).is_err());
    }

    #[test]
    fn digests_differ_across_algorithms() {
        let sha = Digest::of_data(Algorithm::Sha256, b"data");
        let b3 = Digest::of_data(Algorithm::Blake3, b"data");
        assert_ne!(sha, b3);
    }

    #[tokio::test]
    async fn hashes_and_verifies_file() {
        use std::io::Write;
        let mut temp = tempfile::NamedTempFile::new().unwrap();
        temp.write_all(b"artifact bytes").unwrap();

        let expected = Digest::of_data(Algorithm::Sha256, b"artifact bytes");
        let actual = Digest::hash_file(Algorithm::Sha256, temp.path()).await.unwrap();
        assert_eq!(expected, actual);
        verify_file(temp.path(), &expected).await.unwrap();
    }

    #[tokio::test]
    async fn verify_reports_mismatch() {
        use std::io::Write;
        let mut temp = tempfile::NamedTempFile::new().unwrap();
        temp.write_all(b"tampered").unwrap();

        let expected = Digest::of_data(Algorithm::Sha256, b"original");
        let err = verify_file(temp.path(), &expected).await.unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}
