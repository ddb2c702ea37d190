#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! BLAKE3 content digests
//!
//! Feature manifests may carry a `[digests]` table mapping a content
//! identifier to the lowercase hex BLAKE3 digest of its bytes. The digest
//! verifier streams the content through [`Digest::of_stream`] and compares.

use blake3::Hasher;
use fman_errors::{Error, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_BUF: usize = 64 * 1024;

/// A BLAKE3 digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; blake3::OUT_LEN]);

impl Digest {
    /// Digest of an in-memory buffer
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Digest of everything readable from `reader`, with the byte count
    ///
    /// # Errors
    ///
    /// Returns an I/O error if reading fails.
    pub async fn of_stream<R>(mut reader: R) -> Result<(Self, u64), Error>
    where
        R: AsyncRead + Unpin,
    {
        let mut hasher = Hasher::new();
        let mut buf = vec![0; READ_BUF];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            total += n as u64;
        }
        Ok((Self(*hasher.finalize().as_bytes()), total))
    }

    /// Digest of a file on disk
    ///
    /// # Errors
    ///
    /// Returns `StorageError::PathNotFound` if the file cannot be opened, or
    /// an I/O error if reading fails.
    pub async fn of_file(path: &Path) -> Result<Self, Error> {
        let file = File::open(path)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, path))?;
        Ok(Self::of_stream(file).await?.0)
    }

    /// Lowercase hex form, as written in manifests
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the hex form
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidDigest` unless `s` is exactly 64 hex digits.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let bytes = hex::decode(s.trim()).map_err(|e| StorageError::InvalidDigest {
            message: format!("{s}: {e}"),
        })?;
        let bytes: [u8; blake3::OUT_LEN] =
            bytes
                .try_into()
                .map_err(|b: Vec<u8>| StorageError::InvalidDigest {
                    message: format!("expected {} bytes, got {}", blake3::OUT_LEN, b.len()),
                })?;
        Ok(Self(bytes))
    }

    /// Compare against the content of `reader`; `Some(actual)` on mismatch
    ///
    /// # Errors
    ///
    /// Returns an I/O error if reading fails.
    pub async fn check_stream<R>(&self, reader: R) -> Result<Option<Digest>, Error>
    where
        R: AsyncRead + Unpin,
    {
        let (actual, _) = Self::of_stream(reader).await?;
        Ok((actual != *self).then_some(actual))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // BLAKE3 of "hello world"
        assert_eq!(
            Digest::of(b"hello world").to_hex(),
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
        );
    }

    #[test]
    fn serde_uses_hex() {
        let digest = Digest::of(b"plugin.jar");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", digest.to_hex()));
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }

    #[tokio::test]
    async fn stream_counts_bytes() {
        let data = b"streamed archive bytes";
        let (digest, bytes) = Digest::of_stream(std::io::Cursor::new(data)).await.unwrap();
        assert_eq!(bytes, data.len() as u64);
        assert_eq!(digest, Digest::of(data));
    }

    #[tokio::test]
    async fn check_reports_the_actual_digest() {
        let expected = Digest::of(b"payload");
        assert!(expected
            .check_stream(std::io::Cursor::new(b"payload"))
            .await
            .unwrap()
            .is_none());
        let actual = expected
            .check_stream(std::io::Cursor::new(b"tampered"))
            .await
            .unwrap();
        assert_eq!(actual, Some(Digest::of(b"tampered")));
    }
}
