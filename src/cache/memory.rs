use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{CacheError, CacheStore, glob_match};

/// Process-local cache used when no Redis URL is configured and in tests.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, (String, Instant)>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now() + ttl;
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, at)| *at > Instant::now());
        entries.insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn del_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryCache::new();
        cache
            .set("order:1", "{}".into(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("order:1").await.unwrap().as_deref(), Some("{}"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get("order:1").await.unwrap().is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn del_pattern_counts_removed_keys() {
        let cache = InMemoryCache::new();
        for key in ["menu:a:1", "menu:a:2", "menu:b:1", "order:9"] {
            cache.set(key, "x".into(), Duration::from_secs(60)).await.unwrap();
        }
        assert_eq!(cache.del_pattern("menu:a:*").await.unwrap(), 2);
        assert_eq!(cache.len().await, 2);
    }
}
