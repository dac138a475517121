//! Compression Support
//!
//! String-to-string codecs: a byte compressor paired with a text encoding so
//! the output can live in a string-only backend. Whatever pairing compressed
//! an entry must be used to decompress it.

use crate::error::{Error, Result};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Codec Configuration
// =============================================================================

/// Byte compression algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    #[default]
    Lz4,
    Zstd,
    Snappy,
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionAlgorithm::Lz4 => write!(f, "lz4"),
            CompressionAlgorithm::Zstd => write!(f, "zstd"),
            CompressionAlgorithm::Snappy => write!(f, "snappy"),
        }
    }
}

/// Text encoding applied to compressed bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    /// RFC 4648 base64 with padding
    #[default]
    Base64,
    /// URL- and filename-safe base64 without padding
    Base64UrlSafe,
}

/// Compressor and encoding pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CompressionCodec {
    #[serde(default)]
    pub algorithm: CompressionAlgorithm,
    #[serde(default)]
    pub encoding: TextEncoding,
}

impl CompressionCodec {
    pub fn new(algorithm: CompressionAlgorithm, encoding: TextEncoding) -> Self {
        Self {
            algorithm,
            encoding,
        }
    }
}

impl fmt::Display for CompressionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encoding {
            TextEncoding::Base64 => write!(f, "{}-base64", self.algorithm),
            TextEncoding::Base64UrlSafe => write!(f, "{}-base64url", self.algorithm),
        }
    }
}

impl FromStr for CompressionCodec {
    type Err = String;

    /// Parses `lz4`, `zstd-base64`, `snappy-base64url`, ...
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let (algo, encoding) = match lower.split_once('-') {
            Some((algo, enc)) => (algo.to_string(), Some(enc.to_string())),
            None => (lower, None),
        };

        let algorithm = match algo.as_str() {
            "lz4" => CompressionAlgorithm::Lz4,
            "zstd" => CompressionAlgorithm::Zstd,
            "snappy" => CompressionAlgorithm::Snappy,
            other => return Err(format!("unknown compression algorithm: {other}")),
        };
        let encoding = match encoding.as_deref() {
            None | Some("base64") => TextEncoding::Base64,
            Some("base64url") => TextEncoding::Base64UrlSafe,
            Some(other) => return Err(format!("unknown text encoding: {other}")),
        };

        Ok(Self::new(algorithm, encoding))
    }
}

// =============================================================================
// Compressor Trait
// =============================================================================

/// Trait for byte compression implementations
pub trait Compressor: Send + Sync {
    /// Get the algorithm identifier
    fn algorithm(&self) -> CompressionAlgorithm;

    /// Compress data
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress data
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

// =============================================================================
// LZ4 Compressor
// =============================================================================

/// Upper bound on LZ4 expansion per input byte
const LZ4_MAX_RATIO: usize = 255;

/// LZ4 compressor (fast compression)
pub struct Lz4Compressor {
    level: i32,
}

impl Lz4Compressor {
    pub fn new() -> Self {
        Self { level: 4 }
    }

    pub fn with_level(level: i32) -> Self {
        Self { level }
    }
}

impl Default for Lz4Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for Lz4Compressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Lz4
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::compress(data, Some(lz4::block::CompressionMode::HIGHCOMPRESSION(self.level)), true)
            .map_err(|e| Error::Compression(format!("LZ4: {}", e)))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        // The block carries its decompressed size up front; reject sizes no
        // LZ4 block of this length could expand to before allocating.
        let header: [u8; 4] = data
            .get(..4)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(|| Error::Decompression("LZ4: block too short".into()))?;
        let claimed = i32::from_le_bytes(header);
        if claimed < 0 || claimed as usize > data.len().saturating_mul(LZ4_MAX_RATIO) {
            return Err(Error::Decompression(format!(
                "LZ4: implausible decompressed size {claimed}"
            )));
        }

        lz4::block::decompress(data, None)
            .map_err(|e| Error::Decompression(format!("LZ4: {}", e)))
    }
}

// =============================================================================
// Zstd Compressor
// =============================================================================

/// Upper bound on a zstd frame's decompressed size
///
/// Zstd has no useful per-byte expansion limit (a few bytes can describe
/// megabytes of repeated input), so frames are capped in absolute terms.
const ZSTD_MAX_DECOMPRESSED: u64 = 64 * 1024 * 1024;

/// Zstd compressor (balanced compression)
pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    pub fn new() -> Self {
        Self { level: 3 }
    }

    pub fn with_level(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for ZstdCompressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Zstd
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        // Single-shot frames record their content size in the header
        zstd::bulk::compress(data, self.level)
            .map_err(|e| Error::Compression(format!("Zstd: {}", e)))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let claimed = zstd::zstd_safe::get_frame_content_size(data)
            .map_err(|_| Error::Decompression("Zstd: not a zstd frame".into()))?
            .ok_or_else(|| Error::Decompression("Zstd: frame has no content size".into()))?;
        if claimed > ZSTD_MAX_DECOMPRESSED {
            return Err(Error::Decompression(format!(
                "Zstd: implausible decompressed size {claimed}"
            )));
        }

        zstd::bulk::decompress(data, claimed as usize)
            .map_err(|e| Error::Decompression(format!("Zstd: {}", e)))
    }
}

// =============================================================================
// Snappy Compressor
// =============================================================================

/// Upper bound on Snappy expansion per input byte
const SNAPPY_MAX_RATIO: usize = 64;

/// Snappy compressor (very fast, lower ratio)
#[derive(Default)]
pub struct SnappyCompressor;

impl Compressor for SnappyCompressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Snappy
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        snap::raw::Encoder::new()
            .compress_vec(data)
            .map_err(|e| Error::Compression(format!("Snappy: {}", e)))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let claimed = snap::raw::decompress_len(data)
            .map_err(|e| Error::Decompression(format!("Snappy: {}", e)))?;
        if claimed > data.len().saturating_mul(SNAPPY_MAX_RATIO) {
            return Err(Error::Decompression(format!(
                "Snappy: implausible decompressed size {claimed}"
            )));
        }

        snap::raw::Decoder::new()
            .decompress_vec(data)
            .map_err(|e| Error::Decompression(format!("Snappy: {}", e)))
    }
}

// =============================================================================
// Text Codec
// =============================================================================

/// String codec used on the cache's write and read paths
pub struct TextCodec {
    codec: CompressionCodec,
    lz4: Lz4Compressor,
    zstd: ZstdCompressor,
    snappy: SnappyCompressor,
}

impl TextCodec {
    pub fn new(codec: CompressionCodec) -> Self {
        Self {
            codec,
            lz4: Lz4Compressor::new(),
            zstd: ZstdCompressor::new(),
            snappy: SnappyCompressor,
        }
    }

    /// The pairing this codec applies
    pub fn codec(&self) -> CompressionCodec {
        self.codec
    }

    fn compressor(&self) -> &dyn Compressor {
        match self.codec.algorithm {
            CompressionAlgorithm::Lz4 => &self.lz4,
            CompressionAlgorithm::Zstd => &self.zstd,
            CompressionAlgorithm::Snappy => &self.snappy,
        }
    }

    /// Compress a serialized value into its stored text form
    pub fn compress(&self, text: &str) -> Result<String> {
        let bytes = self.compressor().compress(text.as_bytes())?;
        Ok(match self.codec.encoding {
            TextEncoding::Base64 => STANDARD.encode(bytes),
            TextEncoding::Base64UrlSafe => URL_SAFE_NO_PAD.encode(bytes),
        })
    }

    /// Recover the serialized value from its stored text form
    pub fn decompress(&self, stored: &str) -> Result<String> {
        let bytes = match self.codec.encoding {
            TextEncoding::Base64 => STANDARD.decode(stored),
            TextEncoding::Base64UrlSafe => URL_SAFE_NO_PAD.decode(stored),
        }
        .map_err(|e| Error::Decompression(format!("{}: {}", self.codec, e)))?;

        let raw = self.compressor().decompress(&bytes)?;
        String::from_utf8(raw).map_err(|e| Error::Decompression(format!("{}: {}", self.codec, e)))
    }
}

impl Default for TextCodec {
    fn default() -> Self {
        Self::new(CompressionCodec::default())
    }
}
