use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;

use super::KvStore;
use crate::error::{AppError, Result};

/// Direct Redis backend.
///
/// The connection manager is established lazily on first use and then
/// shared by every concurrent request; `OnceCell` guarantees a single
/// connection attempt even under concurrent first use.
pub struct RedisKvStore {
    url: String,
    manager: OnceCell<ConnectionManager>,
}

impl RedisKvStore {
    pub fn new(url: String) -> Self {
        Self {
            url,
            manager: OnceCell::new(),
        }
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                let client = redis::Client::open(self.url.as_str())?;
                let manager = ConnectionManager::new(client).await?;
                tracing::info!("✅ Redis connection manager established");
                Ok::<_, AppError>(manager)
            })
            .await?;
        Ok(manager.clone())
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()> {
        let mut conn = self.connection().await?;
        match ttl_seconds {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }
}
