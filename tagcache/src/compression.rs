//! Payload compression hook.
//!
//! The entry store calls a [`Compressor`] on every write and read when one is
//! configured. Built-in codecs are available behind the `gzip` (default) and
//! `zstd` features; anything else can be plugged in by implementing the trait.

use crate::error::{CacheError, CacheResult};
#[cfg(any(feature = "gzip", feature = "zstd"))]
use std::io::{Read, Write};

/// Compresses payloads before they reach the store.
pub trait Compressor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Compress a payload.
    fn compress(&self, data: &[u8]) -> CacheResult<Vec<u8>>;

    /// Reverse [`Compressor::compress`].
    fn decompress(&self, data: &[u8]) -> CacheResult<Vec<u8>>;
}

/// Built-in compression algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgorithm {
    /// Gzip
    #[cfg(feature = "gzip")]
    Gzip { level: u32 },

    /// Zstd
    #[cfg(feature = "zstd")]
    Zstd { level: i32 },

    /// No compression (pass-through)
    None,
}

impl CompressionAlgorithm {
    /// The algorithm used when the `compress` option is switched on.
    pub fn preferred() -> Self {
        #[cfg(feature = "gzip")]
        return Self::Gzip { level: 6 };

        #[cfg(all(not(feature = "gzip"), feature = "zstd"))]
        return Self::Zstd { level: 3 };

        #[cfg(not(any(feature = "gzip", feature = "zstd")))]
        return Self::None;
    }
}

impl Compressor for CompressionAlgorithm {
    fn name(&self) -> &'static str {
        match self {
            #[cfg(feature = "gzip")]
            Self::Gzip { .. } => "gzip",
            #[cfg(feature = "zstd")]
            Self::Zstd { .. } => "zstd",
            Self::None => "none",
        }
    }

    fn compress(&self, data: &[u8]) -> CacheResult<Vec<u8>> {
        match self {
            #[cfg(feature = "gzip")]
            Self::Gzip { level } => compress_gzip(data, *level),
            #[cfg(feature = "zstd")]
            Self::Zstd { level } => zstd::encode_all(data, *level)
                .map_err(|e| CacheError::Compression(e.to_string())),
            Self::None => Ok(data.to_vec()),
        }
    }

    fn decompress(&self, data: &[u8]) -> CacheResult<Vec<u8>> {
        match self {
            #[cfg(feature = "gzip")]
            Self::Gzip { .. } => decompress_gzip(data),
            #[cfg(feature = "zstd")]
            Self::Zstd { .. } => {
                let mut decoder = zstd::Decoder::new(data)
                    .map_err(|e| CacheError::Compression(e.to_string()))?;
                let mut out = Vec::new();
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| CacheError::Compression(e.to_string()))?;
                Ok(out)
            }
            Self::None => Ok(data.to_vec()),
        }
    }
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ========== Gzip Implementation ==========

#[cfg(feature = "gzip")]
fn compress_gzip(data: &[u8], level: u32) -> CacheResult<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::GzEncoder;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level));
    encoder
        .write_all(data)
        .map_err(|e| CacheError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| CacheError::Compression(e.to_string()))
}

#[cfg(feature = "gzip")]
fn decompress_gzip(data: &[u8]) -> CacheResult<Vec<u8>> {
    use flate2::read::GzDecoder;

    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CacheError::Compression(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &[u8] = b"tagged payload tagged payload tagged payload tagged payload";

    #[test]
    fn test_none_is_passthrough() {
        let algo = CompressionAlgorithm::None;
        assert_eq!(algo.compress(TEXT).unwrap(), TEXT.to_vec());
        assert_eq!(algo.decompress(TEXT).unwrap(), TEXT.to_vec());
        assert_eq!(algo.to_string(), "none");
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn test_gzip() {
        let algo = CompressionAlgorithm::Gzip { level: 6 };
        let compressed = algo.compress(TEXT).unwrap();
        assert_ne!(compressed, TEXT.to_vec());
        assert_eq!(algo.decompress(&compressed).unwrap(), TEXT.to_vec());
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn test_gzip_rejects_garbage() {
        let algo = CompressionAlgorithm::Gzip { level: 6 };
        let err = algo.decompress(b"not gzip at all").unwrap_err();
        assert!(matches!(err, CacheError::Compression(_)));
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn test_zstd() {
        let algo = CompressionAlgorithm::Zstd { level: 3 };
        let compressed = algo.compress(TEXT).unwrap();
        assert_ne!(compressed, TEXT.to_vec());
        assert_eq!(algo.decompress(&compressed).unwrap(), TEXT.to_vec());
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn test_preferred_is_gzip() {
        assert_eq!(CompressionAlgorithm::preferred().name(), "gzip");
    }
}
