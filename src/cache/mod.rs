//! Read-through caching and best-effort invalidation.
//!
//! The cache is an optimization only. Every error coming out of a
//! [`CacheStore`] is logged and swallowed here; callers never see it.

mod memory;
mod redis_store;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppResult;

pub use self::memory::InMemoryCache;
pub use self::redis_store::RedisCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache value could not be encoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key/value store with per-key expiry and glob deletion.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn del(&self, key: &str) -> Result<(), CacheError>;

    /// Deletes every key matching a glob (`*` and `?`). Returns how many went.
    async fn del_pattern(&self, pattern: &str) -> Result<u64, CacheError>;
}

pub mod keys {
    use uuid::Uuid;

    pub fn order(order_id: Uuid) -> String {
        format!("order:{order_id}")
    }

    pub fn active_orders(restaurant_id: Uuid) -> String {
        format!("orders:active:{restaurant_id}")
    }

    pub fn table_session(table_id: Uuid) -> String {
        format!("session:table:{table_id}")
    }

    pub fn active_sessions(restaurant_id: Uuid) -> String {
        format!("sessions:active:{restaurant_id}")
    }

    pub fn menu(restaurant_id: Uuid, filter_hash: &str) -> String {
        format!("menu:{restaurant_id}:{filter_hash}")
    }

    pub fn menu_pattern(restaurant_id: Uuid) -> String {
        format!("menu:{restaurant_id}:*")
    }

    pub fn restaurant(restaurant_id: Uuid) -> String {
        format!("restaurant:{restaurant_id}")
    }
}

pub mod ttl {
    use std::time::Duration;

    pub const ORDER: Duration = Duration::from_secs(60);
    pub const ACTIVE_ORDERS: Duration = Duration::from_secs(30);
    pub const TABLE_SESSION: Duration = Duration::from_secs(60);
    pub const ACTIVE_SESSIONS: Duration = Duration::from_secs(30);
    pub const MENU: Duration = Duration::from_secs(300);
    pub const RESTAURANT: Duration = Duration::from_secs(600);
}

#[derive(Clone)]
pub struct CacheInvalidator {
    store: Arc<dyn CacheStore>,
}

impl CacheInvalidator {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Returns the cached value for `key`, or runs `load`, stores its result
    /// for `ttl` and returns it. Only `load` errors reach the caller.
    pub async fn get_or_load<T, F, Fut>(&self, key: &str, ttl: Duration, load: F) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    tracing::debug!(key, "cache hit");
                    return Ok(value);
                }
                Err(err) => tracing::warn!(key, error = %err, "discarding undecodable cache entry"),
            },
            Ok(None) => tracing::debug!(key, "cache miss"),
            Err(err) => tracing::warn!(key, error = %err, "cache read failed"),
        }

        let value = load().await?;
        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(err) = self.store.set(key, raw, ttl).await {
                    tracing::warn!(key, error = %err, "cache write failed");
                }
            }
            Err(err) => tracing::warn!(key, error = %err, "cache encode failed"),
        }
        Ok(value)
    }

    /// Drops the order entry and the restaurant's active-order list.
    pub async fn order_changed(&self, order_id: Uuid, restaurant_id: Uuid) {
        self.del(&keys::order(order_id)).await;
        self.del(&keys::active_orders(restaurant_id)).await;
    }

    /// Drops the table's session entry and the restaurant's session list.
    pub async fn session_changed(&self, table_id: Uuid, restaurant_id: Uuid) {
        self.del(&keys::table_session(table_id)).await;
        self.del(&keys::active_sessions(restaurant_id)).await;
    }

    /// Drops every cached menu listing of the restaurant, whatever the filters.
    pub async fn menu_changed(&self, restaurant_id: Uuid) {
        let pattern = keys::menu_pattern(restaurant_id);
        match self.store.del_pattern(&pattern).await {
            Ok(removed) => tracing::debug!(pattern = %pattern, removed, "cache pattern invalidated"),
            Err(err) => tracing::warn!(pattern = %pattern, error = %err, "cache pattern delete failed"),
        }
    }

    async fn del(&self, key: &str) {
        if let Err(err) = self.store.del(key).await {
            tracing::warn!(key, error = %err, "cache delete failed");
        }
    }
}

/// Glob match supporting `*` (any run) and `?` (one char), as Redis `MATCH` does.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::AppError;

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }

        async fn del(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }

        async fn del_pattern(&self, _pattern: &str) -> Result<u64, CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }
    }

    #[test]
    fn glob_matching() {
        assert!(glob_match("menu:r1:*", "menu:r1:abc"));
        assert!(glob_match("menu:r1:*", "menu:r1:"));
        assert!(!glob_match("menu:r1:*", "menu:r2:abc"));
        assert!(glob_match("order:?", "order:7"));
        assert!(!glob_match("order:?", "order:77"));
        assert!(glob_match("*:active:*", "orders:active:r1"));
        assert!(!glob_match("orders", "orders:active"));
    }

    #[tokio::test]
    async fn read_through_loads_once() {
        let cache = CacheInvalidator::new(Arc::new(InMemoryCache::new()));
        let loads = AtomicU32::new(0);

        for _ in 0..3 {
            let value: Vec<u32> = cache
                .get_or_load("k", Duration::from_secs(60), || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .await
                .unwrap();
            assert_eq!(value, vec![1, 2, 3]);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn broken_backend_falls_through_to_loader() {
        let cache = CacheInvalidator::new(Arc::new(BrokenStore));
        let value: u32 = cache
            .get_or_load("k", Duration::from_secs(60), || async { Ok(5) })
            .await
            .unwrap();
        assert_eq!(value, 5);

        // Invalidation against a dead backend is silent.
        cache.order_changed(Uuid::new_v4(), Uuid::new_v4()).await;
        cache.menu_changed(Uuid::new_v4()).await;
    }

    #[tokio::test]
    async fn loader_errors_propagate() {
        let cache = CacheInvalidator::new(Arc::new(InMemoryCache::new()));
        let result: AppResult<u32> = cache
            .get_or_load("k", Duration::from_secs(60), || async {
                Err(AppError::NotFound("order"))
            })
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn menu_invalidation_only_touches_one_restaurant() {
        let store = Arc::new(InMemoryCache::new());
        let cache = CacheInvalidator::new(store.clone());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        for key in [keys::menu(a, "x"), keys::menu(a, "y"), keys::menu(b, "x")] {
            store.set(&key, "[]".into(), ttl::MENU).await.unwrap();
        }

        cache.menu_changed(a).await;

        assert!(store.get(&keys::menu(a, "x")).await.unwrap().is_none());
        assert!(store.get(&keys::menu(a, "y")).await.unwrap().is_none());
        assert!(store.get(&keys::menu(b, "x")).await.unwrap().is_some());
    }
}
