// src/compression/mod.rs

//! Compression format handling
//!
//! Three formats show up on the wire and inside packages: gzip and xz for
//! `Packages` indices and `data.tar` members, zstd for `data.tar.zst` and
//! for the `manifest.wall` document this tool writes itself. This module
//! picks the right codec from a member name or from magic bytes and hands
//! back streaming readers.

use std::io::{self, Read, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("cannot create {format} decoder: {source}")]
    DecoderCreation {
        format: &'static str,
        source: io::Error,
    },

    #[error("cannot decompress {format} data: {source}")]
    Decompression {
        format: &'static str,
        source: io::Error,
    },
}

/// Supported compression formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// No compression (raw data)
    None,
    /// Gzip (.gz)
    Gzip,
    /// XZ/LZMA (.xz)
    Xz,
    /// Zstandard (.zst)
    Zstd,
}

impl CompressionFormat {
    /// Detect the format from a file or archive-member name
    ///
    /// Used for `data.tar.*` members inside a package and for the
    /// `Packages.{gz,xz}` index paths listed in the signed release file.
    pub fn from_extension(name: &str) -> Self {
        if name.ends_with(".gz") {
            Self::Gzip
        } else if name.ends_with(".xz") {
            Self::Xz
        } else if name.ends_with(".zst") {
            Self::Zstd
        } else {
            Self::None
        }
    }

    /// Detect the format from the first bytes of the data
    ///
    /// Magic bytes:
    /// - Gzip: `1f 8b`
    /// - XZ: `fd 37 7a 58 5a 00`
    /// - Zstd: `28 b5 2f fd`
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b {
            Self::Gzip
        } else if data.len() >= 6 && data[..6] == [0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00] {
            Self::Xz
        } else if data.len() >= 4 && data[..4] == [0x28, 0xb5, 0x2f, 0xfd] {
            Self::Zstd
        } else {
            Self::None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
        }
    }
}

impl std::fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Create a decompressing reader for the given format
///
/// For `CompressionFormat::None` the reader passes through unchanged.
pub fn create_decoder<'a, R: Read + 'a>(
    reader: R,
    format: CompressionFormat,
) -> Result<Box<dyn Read + 'a>, CompressionError> {
    match format {
        CompressionFormat::None => Ok(Box::new(reader)),
        CompressionFormat::Gzip => Ok(Box::new(flate2::read::GzDecoder::new(reader))),
        CompressionFormat::Xz => Ok(Box::new(xz2::read::XzDecoder::new(reader))),
        CompressionFormat::Zstd => {
            let decoder =
                zstd::Decoder::new(reader).map_err(|e| CompressionError::DecoderCreation {
                    format: "zstd",
                    source: e,
                })?;
            Ok(Box::new(decoder))
        }
    }
}

/// Decompress a byte slice, detecting the format from magic bytes
pub fn decompress_auto(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    decompress(data, CompressionFormat::from_magic_bytes(data))
}

/// Decompress a byte slice using the specified format
pub fn decompress(data: &[u8], format: CompressionFormat) -> Result<Vec<u8>, CompressionError> {
    let mut decoder = create_decoder(data, format)?;
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|e| CompressionError::Decompression {
            format: format.name(),
            source: e,
        })?;
    Ok(output)
}

/// Compress bytes with zstd at the default level
///
/// The manifest document is the only thing this tool compresses itself.
pub fn zstd_compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 0)?;
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            CompressionFormat::from_extension("data.tar.gz"),
            CompressionFormat::Gzip
        );
        assert_eq!(
            CompressionFormat::from_extension("data.tar.xz"),
            CompressionFormat::Xz
        );
        assert_eq!(
            CompressionFormat::from_extension("data.tar.zst"),
            CompressionFormat::Zstd
        );
        assert_eq!(
            CompressionFormat::from_extension("data.tar"),
            CompressionFormat::None
        );
        assert_eq!(
            CompressionFormat::from_extension("Packages.gz"),
            CompressionFormat::Gzip
        );
    }

    #[test]
    fn test_format_from_magic_bytes() {
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0x1f, 0x8b, 0x08, 0x00]),
            CompressionFormat::Gzip
        );
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]),
            CompressionFormat::Xz
        );
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0x28, 0xb5, 0x2f, 0xfd]),
            CompressionFormat::Zstd
        );
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0x00, 0x00, 0x00, 0x00]),
            CompressionFormat::None
        );
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0x1f]),
            CompressionFormat::None
        );
    }

    #[test]
    fn test_gzip_round_trip() {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"index content").unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(
            CompressionFormat::from_magic_bytes(&compressed),
            CompressionFormat::Gzip
        );
        assert_eq!(decompress_auto(&compressed).unwrap(), b"index content");
    }

    #[test]
    fn test_zstd_round_trip() {
        let compressed = zstd_compress(b"manifest body").unwrap();
        assert_eq!(
            CompressionFormat::from_magic_bytes(&compressed),
            CompressionFormat::Zstd
        );
        assert_eq!(decompress_auto(&compressed).unwrap(), b"manifest body");
    }

    #[test]
    fn test_decompress_none_passthrough() {
        assert_eq!(
            decompress(b"plain", CompressionFormat::None).unwrap(),
            b"plain"
        );
    }
}
