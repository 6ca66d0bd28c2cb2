use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, KvBackend};
use crate::error::Result;

pub mod memory;
pub mod redis;
pub mod webdis;

/// Minimal key-value contract the session core runs on.
///
/// Values are JSON text; serialization stays with the caller so the trait
/// remains object-safe and the backends stay dumb pipes.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Overwrites `key` with `value`. With `ttl_seconds` the key expires
    /// that many seconds from now; without, it lives until deleted.
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()>;

    /// Returns the value at `key`, or `None` if missing or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Removes `key`. Idempotent: deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Selects the backend configured at startup.
///
/// # Arguments
///
/// * `config` - The application's configuration.
///
/// # Returns
///
/// A shared handle to the chosen `KvStore` implementation.
pub fn from_config(config: &Config) -> Arc<dyn KvStore> {
    match config.kv_backend {
        KvBackend::Redis => Arc::new(redis::RedisKvStore::new(config.redis_url.clone())),
        KvBackend::Webdis => Arc::new(webdis::WebdisKvStore::new(config.redis_http_url.clone())),
        KvBackend::Memory => Arc::new(memory::MemoryKvStore::new()),
    }
}
