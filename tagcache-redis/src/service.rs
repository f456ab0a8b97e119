//! Redis connection service.

use redis::aio::ConnectionManager;
use tracing::{debug, info};

use crate::{RedisConfig, RedisError, Result};

/// Owns the connection to a single Redis server.
///
/// The wrapped `ConnectionManager` reconnects on its own and is cheap to
/// clone; every clone multiplexes over the same socket.
#[derive(Clone)]
pub struct RedisService {
    config: RedisConfig,
    connection: ConnectionManager,
}

impl RedisService {
    /// Connect to the configured server, failing after `connection_timeout`.
    pub async fn connect(config: RedisConfig) -> Result<Self> {
        let url = config.connection_url()?;
        let client =
            redis::Client::open(url).map_err(|e| RedisError::Connection(e.to_string()))?;

        let connection = tokio::time::timeout(
            config.connection_timeout,
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| RedisError::Timeout)?
        .map_err(|e| RedisError::Connection(e.to_string()))?;

        info!(
            server = %config.server,
            port = config.port,
            "Redis connection established"
        );

        Ok(Self { config, connection })
    }

    /// Get the configuration.
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Get a handle to the connection.
    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }

    /// Check if the connection is healthy.
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| RedisError::Connection(e.to_string()))?;
        debug!(reply = %pong, "Redis health check");
        Ok(())
    }
}
