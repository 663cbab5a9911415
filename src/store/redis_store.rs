use std::sync::Arc;

use redis::AsyncCommands;
use tracing::{debug, instrument};

use super::{validate_key, StoreBackend, StoreError};

const SCAN_BATCH: usize = 200;

/// Redis-backed record store
#[derive(Clone)]
pub struct RedisBackend {
    client: Arc<redis::Client>,
    namespace: String,
}

impl RedisBackend {
    pub async fn connect(redis_url: &str, namespace: impl Into<String>) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;

        // Test connection
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        debug!("Redis connection established");

        Ok(Self {
            client: Arc::new(client),
            namespace: namespace.into(),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Redis connection failed: {}", e)))
    }
}

#[async_trait::async_trait]
impl StoreBackend for RedisBackend {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        validate_key(key)?;
        let mut conn = self.connection().await?;
        let data: Option<String> = conn.get(self.namespaced(key)).await?;
        Ok(data)
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(self.namespaced(key), value).await?;
        Ok(())
    }

    #[instrument(skip(self, value))]
    async fn insert_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        let mut conn = self.connection().await?;
        let result: Option<String> = redis::cmd("SET")
            .arg(self.namespaced(key))
            .arg(value)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        Ok(result.is_some())
    }

    #[instrument(skip(self))]
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", self.namespaced(prefix));
        let strip = format!("{}:", self.namespace);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(
                batch
                    .into_iter()
                    .filter_map(|k| k.strip_prefix(&strip).map(str::to_string)),
            );
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires a running Redis server on 127.0.0.1:6379"]
    async fn redis_backend_round_trip() {
        let backend = RedisBackend::connect("redis://127.0.0.1:6379", "storefront-test")
            .await
            .unwrap();
        let key = format!("order-T{}", uuid::Uuid::new_v4().simple());
        assert!(backend.insert_if_absent(&key, "one").await.unwrap());
        assert!(!backend.insert_if_absent(&key, "two").await.unwrap());
        assert_eq!(backend.get(&key).await.unwrap().as_deref(), Some("one"));
        assert!(backend.list("order-T").await.unwrap().contains(&key));
    }
}
