// src/hash.rs

//! SHA-256 digest helpers
//!
//! Every digest this tool deals with is SHA-256: the signed index records
//! them, package payloads are verified against them, and the report carries
//! one per regular file. The helpers here cover the three access patterns:
//! whole slices, readers, and streaming tee-hashing during extraction.

use sha2::{Digest, Sha256};
use std::io::{self, Read};

/// Compute the SHA-256 digest of a byte slice as a lowercase hex string
pub fn sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Compute the SHA-256 digest of everything a reader yields
pub fn sha256_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Digest mismatch details for verification failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyError {
    pub expected: String,
    pub actual: String,
}

/// Verify bytes match an expected lowercase hex digest
pub fn verify_sha256(data: &[u8], expected: &str) -> Result<(), VerifyError> {
    let actual = sha256(data);
    if actual == expected.to_lowercase() {
        Ok(())
    } else {
        Err(VerifyError {
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Reader adapter that hashes and counts bytes as they stream through
///
/// The slicer wraps tar entry readers in this so a single pass produces the
/// file content, its digest and its size.
pub struct HashingReader<R: Read> {
    inner: R,
    hasher: Sha256,
    size: u64,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            size: 0,
        }
    }

    /// Digest and byte count of everything read so far
    pub fn finish(self) -> (String, u64) {
        (format!("{:x}", self.hasher.finalize()), self.size)
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.size += n as u64;
        Ok(n)
    }
}
