//! # tagcache-redis
//!
//! Redis connection plumbing for the tagcache backend.
//!
//! ## Features
//!
//! - **Configuration**: host/port based config with builder and environment loading
//! - **Connection setup**: auto-reconnecting `ConnectionManager` with a connect timeout
//! - **Health checks**: `PING` round-trip
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tagcache_redis::{RedisService, RedisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisConfig::builder()
//!         .server("127.0.0.1")
//!         .port(6379)
//!         .build();
//!
//!     let redis = RedisService::connect(config).await?;
//!     redis.health_check().await?;
//!
//!     let mut conn = redis.connection();
//!     let _: () = redis::cmd("SET")
//!         .arg("key")
//!         .arg("value")
//!         .query_async(&mut conn)
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod service;

pub use config::{RedisConfig, RedisConfigBuilder};
pub use error::{RedisError, Result};
pub use service::RedisService;

// Re-export redis crate for convenience
pub use redis;
pub use redis::aio::ConnectionManager;

/// Prelude for common imports.
///
/// ```
/// use tagcache_redis::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{RedisConfig, RedisConfigBuilder};
    pub use crate::error::{RedisError, Result};
    pub use crate::service::RedisService;
    pub use redis::AsyncCommands;
}
