//! Cache/session adapter: TTL key-value plus pub/sub, backed by Redis via
//! `redis::AsyncCommands`, behind the same async-trait interface as every
//! other adapter so it can be mocked for tests.

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::error::{Backend, CoreError};

use super::BackendAdapter;

#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait CacheAdapter: BackendAdapter {
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CoreError>;
    async fn get_value(&self, key: &str) -> Result<Option<String>, CoreError>;
    async fn delete_prefix(&self, prefix: &str) -> Result<(), CoreError>;
    async fn publish(&self, channel: &str, message: &str) -> Result<(), CoreError>;

    /// Same as [`BackendAdapter::store`] but with a caller-chosen TTL,
    /// for callers that need something other than the fixed 3600s
    /// default `store` uses.
    async fn store_with_ttl(
        &self,
        entity_id: &str,
        payload: serde_json::Value,
        ttl_seconds: u64,
    ) -> Result<(), CoreError>;
}

pub struct RedisCacheAdapter {
    client: redis::Client,
}

impl RedisCacheAdapter {
    pub fn new(redis_url: &str) -> Result<Self, CoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CoreError::Internal(format!("invalid redis url: {e}")))?;
        Ok(RedisCacheAdapter { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(CoreError::from)
    }
}

#[async_trait]
impl BackendAdapter for RedisCacheAdapter {
    fn backend(&self) -> Backend {
        Backend::Cache
    }

    async fn store(&self, entity_id: &str, payload: serde_json::Value) -> Result<(), CoreError> {
        self.set(&cache_key(entity_id), &payload.to_string(), 3600).await
    }

    async fn delete(&self, entity_id: &str) -> Result<(), CoreError> {
        let mut conn = self.connection().await?;
        let _: () = conn.del(cache_key(entity_id)).await?;
        Ok(())
    }

    async fn retrieve(&self, entity_id: &str) -> Result<Option<serde_json::Value>, CoreError> {
        let raw = self.get_value(&cache_key(entity_id)).await?;
        raw.map(|s| serde_json::from_str(&s).map_err(CoreError::from))
            .transpose()
    }

    async fn is_available(&self) -> bool {
        self.connection().await.is_ok()
    }
}

#[async_trait]
impl CacheAdapter for RedisCacheAdapter {
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CoreError> {
        let mut conn = self.connection().await?;
        let _: () = conn.set_ex(key, value, ttl_seconds).await?;
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>, CoreError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), CoreError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{prefix}*");
        let keys: Vec<String> = conn.keys(pattern).await?;
        if !keys.is_empty() {
            let _: () = conn.del(keys).await?;
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), CoreError> {
        let mut conn = self.connection().await?;
        let _: () = conn.publish(channel, message).await?;
        Ok(())
    }

    async fn store_with_ttl(
        &self,
        entity_id: &str,
        payload: serde_json::Value,
        ttl_seconds: u64,
    ) -> Result<(), CoreError> {
        self.set(&cache_key(entity_id), &payload.to_string(), ttl_seconds).await
    }
}

/// Namespaced Redis key for a document entity id. Public so callers that
/// need a custom TTL (`store_document`) can call [`CacheAdapter::set`]
/// directly with the same key [`BackendAdapter::store`] would use.
#[must_use]
pub fn cache_key(entity_id: &str) -> String {
    format!("document:{entity_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_namespaced() {
        assert_eq!(cache_key("d1"), "document:d1");
    }
}
