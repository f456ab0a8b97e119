//! Cache configuration types.

use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

/// Longest entry lifetime the backend accepts (30 days).
pub const MAX_LIFETIME: Duration = Duration::from_secs(2_592_000);

/// Entry lifetime used when none is configured.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(3600);

/// What `save` does with the tags an id already carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagPolicy {
    /// Detach the id from its previous tags first; the index then reflects
    /// exactly the tags of the latest save.
    #[default]
    Replace,
    /// Keep previous tags and add the new ones.
    Union,
}

impl FromStr for TagPolicy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "union" => Ok(Self::Union),
            other => Err(CacheError::Config(format!(
                "unknown tag policy '{}', expected 'replace' or 'union'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for TagPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Replace => write!(f, "replace"),
            Self::Union => write!(f, "union"),
        }
    }
}

/// Loosely typed option value, as handed over by a cache manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// No value
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// String
    Str(String),
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u16> for OptionValue {
    fn from(v: u16) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl<T: Into<OptionValue>> From<Option<T>> for OptionValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Redis host
    pub server: String,

    /// Redis port
    pub port: u16,

    /// Compress payloads before storing them
    pub compress: bool,

    /// Default lifetime for entries; `None` stores without expiry
    #[serde(with = "optional_seconds")]
    pub lifetime: Option<Duration>,

    /// How repeated saves treat previous tags
    pub tag_policy: TagPolicy,

    /// Redis database number
    pub database: Option<u8>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1".to_string(),
            port: 6379,
            compress: false,
            lifetime: Some(DEFAULT_LIFETIME),
            tag_policy: TagPolicy::default(),
            database: None,
        }
    }
}

impl CacheConfig {
    /// Create a configuration with default options.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagcache::CacheConfig;
    ///
    /// let config = CacheConfig::new();
    /// assert_eq!(config.server, "127.0.0.1");
    /// assert_eq!(config.port, 6379);
    /// assert!(!config.compress);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from `TAGCACHE_*` environment variables.
    ///
    /// Variables that are set but malformed are reported as errors rather
    /// than silently ignored.
    pub fn from_env() -> CacheResult<Self> {
        let mut config = Self::default();

        if let Ok(server) = std::env::var("TAGCACHE_SERVER") {
            config.set_option("server", server)?;
        }
        if let Ok(port) = std::env::var("TAGCACHE_PORT") {
            config.set_option("port", port)?;
        }
        if let Ok(compress) = std::env::var("TAGCACHE_COMPRESS") {
            let enabled = compress == "1" || compress.eq_ignore_ascii_case("true");
            config.set_option("compress", enabled)?;
        }
        if let Ok(lifetime) = std::env::var("TAGCACHE_LIFETIME") {
            let secs: i64 = lifetime.parse().map_err(|_| {
                CacheError::Config(format!("TAGCACHE_LIFETIME is not a number: {}", lifetime))
            })?;
            config.set_option("lifetime", secs)?;
        }
        if let Ok(policy) = std::env::var("TAGCACHE_TAG_POLICY") {
            config.set_option("tag_policy", policy)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the Redis host.
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// Set the Redis port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enable or disable payload compression.
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    /// Set the default entry lifetime.
    pub fn with_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Set the tag policy.
    pub fn with_tag_policy(mut self, policy: TagPolicy) -> Self {
        self.tag_policy = policy;
        self
    }

    /// Set the Redis database number.
    pub fn with_database(mut self, db: u8) -> Self {
        self.database = Some(db);
        self
    }

    /// Check the configuration. Called before a backend is built.
    pub fn validate(&self) -> CacheResult<()> {
        if let Some(lifetime) = self.lifetime
            && lifetime > MAX_LIFETIME
        {
            return Err(CacheError::Config(format!(
                "redis backend has a limit of 30 days ({} seconds) for the lifetime, got {} seconds",
                MAX_LIFETIME.as_secs(),
                lifetime.as_secs()
            )));
        }
        if self.server.trim().is_empty() {
            return Err(CacheError::Config("server must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(CacheError::Config("port must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Set an option by name.
    ///
    /// Names are case-insensitive and unknown names are ignored. A value of
    /// the wrong type for a known option is a configuration error, and so is
    /// a value that leaves the configuration invalid. On error the
    /// configuration is left unchanged.
    pub fn set_option(&mut self, name: &str, value: impl Into<OptionValue>) -> CacheResult<()> {
        let mut next = self.clone();
        next.apply_option(&name.to_ascii_lowercase(), value.into())?;
        next.validate()?;
        *self = next;
        Ok(())
    }

    fn apply_option(&mut self, name: &str, value: OptionValue) -> CacheResult<()> {
        match name {
            "server" => match value {
                OptionValue::Str(s) => self.server = s,
                other => return Err(invalid_type(name, &other)),
            },
            "port" => {
                self.port = match &value {
                    OptionValue::Int(n) => u16::try_from(*n).ok(),
                    OptionValue::Str(s) => s.trim().parse().ok(),
                    _ => None,
                }
                .filter(|p| *p != 0)
                .ok_or_else(|| invalid_type(name, &value))?;
            }
            "compress" => match value {
                OptionValue::Bool(b) => self.compress = b,
                OptionValue::Int(0) => self.compress = false,
                OptionValue::Int(1) => self.compress = true,
                other => return Err(invalid_type(name, &other)),
            },
            "lifetime" => {
                self.lifetime = match value {
                    OptionValue::Null | OptionValue::Int(0) => None,
                    OptionValue::Int(n) if n > 0 => Some(Duration::from_secs(n as u64)),
                    other => return Err(invalid_type(name, &other)),
                };
            }
            "tag_policy" => match value {
                OptionValue::Str(s) => self.tag_policy = s.parse()?,
                other => return Err(invalid_type(name, &other)),
            },
            "database" => match value {
                OptionValue::Null => self.database = None,
                OptionValue::Int(n) => {
                    let db = u8::try_from(n)
                        .map_err(|_| invalid_type(name, &OptionValue::Int(n)))?;
                    self.database = Some(db);
                }
                other => return Err(invalid_type(name, &other)),
            },
            _ => {}
        }
        Ok(())
    }

    /// Current options as name/value pairs.
    pub fn options(&self) -> BTreeMap<&'static str, OptionValue> {
        let mut options = BTreeMap::new();
        options.insert("server", OptionValue::from(self.server.as_str()));
        options.insert("port", OptionValue::from(self.port));
        options.insert("compress", OptionValue::from(self.compress));
        options.insert(
            "lifetime",
            OptionValue::from(self.lifetime.map(|d| d.as_secs() as i64)),
        );
        options.insert("tag_policy", OptionValue::from(self.tag_policy.to_string()));
        options.insert(
            "database",
            OptionValue::from(self.database.map(i64::from)),
        );
        options
    }

    /// Connection settings for the Redis store.
    #[cfg(feature = "redis")]
    pub fn redis_config(&self) -> tagcache_redis::RedisConfig {
        let mut builder = tagcache_redis::RedisConfig::builder()
            .server(self.server.clone())
            .port(self.port);
        if let Some(db) = self.database {
            builder = builder.database(db);
        }
        builder.build()
    }
}

fn invalid_type(name: &str, value: &OptionValue) -> CacheError {
    CacheError::Config(format!("invalid value for option '{}': {:?}", name, value))
}

mod optional_seconds {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_secs()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.filter(|s| *s > 0).map(Duration::from_secs))
    }
}
