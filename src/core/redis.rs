use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::{cmd, AsyncCommands, Client, RedisError};
use tokio::sync::RwLock;

#[derive(Clone)]
pub(crate) struct RedisHandle {
    url: String,
    manager: Arc<RwLock<Option<ConnectionManager>>>,
}

#[derive(Debug, Clone)]
pub(crate) enum RedisHealth {
    Healthy,
    Disconnected,
    Unhealthy(String),
}

impl RedisHandle {
    pub(crate) fn new(url: String) -> Self {
        Self { url, manager: Arc::new(RwLock::new(None)) }
    }

    pub(crate) async fn connect(&self) -> Result<(), RedisError> {
        let client = Client::open(self.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        let mut guard = self.manager.write().await;
        *guard = Some(manager);
        Ok(())
    }

    pub(crate) async fn disconnect(&self) {
        let mut guard = self.manager.write().await;
        *guard = None;
    }

    pub(crate) async fn is_connected(&self) -> bool {
        self.manager.read().await.is_some()
    }

    async fn connection(&self) -> Option<ConnectionManager> {
        self.manager.read().await.clone()
    }

    pub(crate) async fn health(&self) -> RedisHealth {
        let Some(mut manager) = self.connection().await else {
            return RedisHealth::Disconnected;
        };

        match cmd("PING").query_async::<_, String>(&mut manager).await {
            Ok(_) => RedisHealth::Healthy,
            Err(err) => RedisHealth::Unhealthy(err.to_string()),
        }
    }

    /// Returns `None` on a miss or when no connection is configured.
    pub(crate) async fn get_string(&self, key: &str) -> Result<Option<String>, RedisError> {
        let Some(mut manager) = self.connection().await else {
            return Ok(None);
        };
        manager.get(key).await
    }

    pub(crate) async fn set_string_ex(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<(), RedisError> {
        let Some(mut manager) = self.connection().await else {
            return Ok(());
        };
        manager.set_ex(key, value, ttl_seconds).await
    }

    /// Reads an integer counter, treating a missing key as zero.
    pub(crate) async fn get_counter(&self, key: &str) -> Result<i64, RedisError> {
        let Some(mut manager) = self.connection().await else {
            return Ok(0);
        };
        let value: Option<i64> = manager.get(key).await?;
        Ok(value.unwrap_or(0))
    }

    pub(crate) async fn incr_counter(&self, key: &str) -> Result<i64, RedisError> {
        let Some(mut manager) = self.connection().await else {
            return Ok(0);
        };
        manager.incr(key, 1_i64).await
    }
}
