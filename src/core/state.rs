use std::sync::Arc;

use sqlx::PgPool;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::services::dashboard_cache::DashboardCache;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    redis: RedisHandle,
    dashboard_cache: DashboardCache,
}

impl AppState {
    pub(crate) fn new(settings: Settings, db: PgPool, redis: RedisHandle) -> Self {
        let dashboard_cache =
            DashboardCache::new(redis.clone(), settings.dashboard().cache_ttl_seconds);
        Self { inner: Arc::new(InnerState { settings, db, redis, dashboard_cache }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn dashboard_cache(&self) -> &DashboardCache {
        &self.inner.dashboard_cache
    }
}
