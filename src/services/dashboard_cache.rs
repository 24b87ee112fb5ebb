use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use time::Date;

use crate::core::metrics;
use crate::core::redis::RedisHandle;
use crate::core::time::format_date;
use crate::services::errors::ServiceError;

const GENERATION_KEY: &str = "dashboard:generation";

type KeyLocks = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Read-through cache for dashboard payloads.
///
/// Every write bumps a shared generation counter, so stale entries are never read
/// again and simply expire.
#[derive(Clone)]
pub(crate) struct DashboardCache {
    redis: RedisHandle,
    ttl_seconds: u64,
    locks: KeyLocks,
}

pub(crate) struct CacheKeyParts<'a> {
    pub(crate) user_id: &'a str,
    pub(crate) role: &'a str,
    pub(crate) filters_hash: &'a str,
    pub(crate) date: Date,
}

pub(crate) fn filters_hash(filters: &impl Serialize) -> String {
    let encoded = serde_json::to_vec(filters).unwrap_or_default();
    hex::encode(Sha256::digest(&encoded))
}

pub(crate) fn cache_key(generation: i64, parts: &CacheKeyParts<'_>) -> String {
    format!(
        "dashboard:v1:{generation}:{}:{}:{}:{}",
        parts.user_id,
        parts.role,
        parts.filters_hash,
        format_date(parts.date)
    )
}

/// Drops the per-key lock entry once its last user is gone, even when the
/// caller's future is cancelled mid-compute.
struct KeyLockGuard {
    locks: KeyLocks,
    key: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for KeyLockGuard {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference in the map, one held here: nobody else is waiting.
        if Arc::strong_count(&self.lock) <= 2 {
            locks.remove(&self.key);
        }
    }
}

impl DashboardCache {
    pub(crate) fn new(redis: RedisHandle, ttl_seconds: u64) -> Self {
        Self { redis, ttl_seconds, locks: Arc::new(Mutex::new(HashMap::new())) }
    }

    async fn generation(&self) -> Option<i64> {
        match self.redis.get_counter(GENERATION_KEY).await {
            Ok(generation) => Some(generation),
            Err(err) => {
                tracing::warn!(error = %err, "Dashboard cache generation unavailable");
                None
            }
        }
    }

    fn key_lock(&self, key: &str) -> KeyLockGuard {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let lock = locks.entry(key.to_string()).or_default().clone();
        KeyLockGuard { locks: self.locks.clone(), key: key.to_string(), lock }
    }


    pub(crate) async fn get_or_compute<T, F, Fut>(
        &self,
        parts: CacheKeyParts<'_>,
        compute: F,
    ) -> Result<T, ServiceError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        if self.ttl_seconds == 0 || !self.redis.is_connected().await {
            metrics::dashboard_cache("bypass");
            return compute().await;
        }
        let Some(generation) = self.generation().await else {
            metrics::dashboard_cache("bypass");
            return compute().await;
        };

        let key = cache_key(generation, &parts);
        let guard = self.key_lock(&key);
        let _held = guard.lock.lock().await;
        let cached = self.read(&key).await;
        let result = match cached {
            Some(value) => {
                metrics::dashboard_cache("hit");
                Ok(value)
            }
            None => {
                metrics::dashboard_cache("miss");
                let value = compute().await;
                if let Ok(value) = &value {
                    self.write(&key, value).await;
                }
                value
            }
        };
        result
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.redis.get_string(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!(error = %err, "Discarding undecodable dashboard cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(error = %err, "Dashboard cache read failed");
                None
            }
        }
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to encode dashboard payload");
                return;
            }
        };
        if let Err(err) = self.redis.set_string_ex(key, &raw, self.ttl_seconds).await {
            tracing::warn!(error = %err, "Dashboard cache write failed");
        }
    }

    /// Makes every cached dashboard stale.
    pub(crate) async fn invalidate(&self) {
        if let Err(err) = self.redis.incr_counter(GENERATION_KEY).await {
            tracing::warn!(error = %err, "Failed to invalidate dashboard cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use time::macros::date;

    use super::{cache_key, filters_hash, CacheKeyParts, DashboardCache};
    use crate::core::config::Settings;
    use crate::core::redis::RedisHandle;
    use crate::test_support;

    fn parts<'a>(hash: &'a str) -> CacheKeyParts<'a> {
        CacheKeyParts { user_id: "u1", role: "admin", filters_hash: hash, date: date!(2024 - 09 - 02) }
    }

    #[test]
    fn key_embeds_generation_and_date() {
        let hash = filters_hash(&json!({"months": 6}));
        assert_eq!(hash.len(), 64);
        let key = cache_key(3, &parts(&hash));
        assert_eq!(key, format!("dashboard:v1:3:u1:admin:{hash}:2024-09-02"));
    }

    #[test]
    fn different_filters_hash_differently() {
        assert_ne!(filters_hash(&json!({"months": 6})), filters_hash(&json!({"months": 7})));
    }

    #[tokio::test]
    async fn disconnected_cache_always_computes() {
        let cache = DashboardCache::new(RedisHandle::new("redis://127.0.0.1:1/0".into()), 60);
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let calls = calls.clone();
            let value: i32 = cache
                .get_or_compute(parts("h"), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
                .expect("value");
            assert_eq!(value, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_recompute() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        let settings = Settings::load().expect("settings");
        test_support::reset_redis(settings.redis().redis_url()).await.expect("redis reset");

        let redis = RedisHandle::new(settings.redis().redis_url());
        redis.connect().await.expect("redis connect");
        let cache = DashboardCache::new(redis, 60);
        let calls = Arc::new(AtomicUsize::new(0));

        let fetch = |calls: Arc<AtomicUsize>| {
            let cache = cache.clone();
            async move {
                cache
                    .get_or_compute(parts("h"), || async move {
                        Ok::<_, crate::services::errors::ServiceError>(
                            calls.fetch_add(1, Ordering::SeqCst),
                        )
                    })
                    .await
                    .expect("value")
            }
        };

        assert_eq!(fetch(calls.clone()).await, 0);
        assert_eq!(fetch(calls.clone()).await, 0);
        cache.invalidate().await;
        assert_eq!(fetch(calls.clone()).await, 1);
    }

    #[tokio::test]
    async fn cancelled_compute_releases_its_key_lock() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        let settings = Settings::load().expect("settings");
        test_support::reset_redis(settings.redis().redis_url()).await.expect("redis reset");

        let redis = RedisHandle::new(settings.redis().redis_url());
        redis.connect().await.expect("redis connect");
        let cache = DashboardCache::new(redis, 60);

        let slow = cache.get_or_compute(parts("slow"), || async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<_, crate::services::errors::ServiceError>(1)
        });
        let outcome = tokio::time::timeout(Duration::from_millis(50), slow).await;

        assert!(outcome.is_err());
        assert!(cache.locks.lock().expect("locks").is_empty());

        let value: i32 = cache
            .get_or_compute(parts("slow"), || async { Ok(2) })
            .await
            .expect("value");
        assert_eq!(value, 2);
        assert!(cache.locks.lock().expect("locks").is_empty());
    }
}
