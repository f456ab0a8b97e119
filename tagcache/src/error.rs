//! Error types for cache operations.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis-specific error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Connection setup error
    #[cfg(feature = "redis")]
    #[error("Connection error: {0}")]
    Connection(#[from] tagcache_redis::RedisError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backend does not implement this operation
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Unrecognized cleaning mode
    #[error("Invalid mode for clean(): {0}")]
    InvalidMode(String),

    /// Payload could not be compressed or decompressed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Generic store failure
    #[error("Store error: {0}")]
    Store(String),
}

impl CacheError {
    /// Whether this error means "not implemented by this backend", as opposed
    /// to a failed or empty result.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_) | Self::InvalidMode(_))
    }

    /// Whether this error came from the configuration layer.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_is_distinguishable() {
        let err = CacheError::Unsupported("touch");
        assert!(err.is_unsupported());
        assert_eq!(err.to_string(), "Unsupported operation: touch");

        assert!(!CacheError::Store("timeout".into()).is_unsupported());
    }

    #[test]
    fn test_config_error_display() {
        let err = CacheError::Config("lifetime too long".into());
        assert!(err.is_config());
        assert!(err.to_string().contains("lifetime too long"));
    }
}
