use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use anyhow::Context;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};

/// Key/value store used for cache-aside reads. Entries always carry a TTL.
#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> anyhow::Result<()>;
    /// Atomically increments an integer counter, creating it at 0 first.
    async fn incr(&self, key: &str) -> anyhow::Result<i64>;
}

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = Client::open(url).context("parse redis url")?;
        let conn = client
            .get_connection_manager()
            .await
            .context("connect to redis")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheClient for RedisCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await.context("redis get")?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .context("redis set_ex")?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> anyhow::Result<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.incr(key, 1).await.context("redis incr")?;
        Ok(value)
    }
}

/// Process-local fallback used when no Redis URL is configured, and in tests.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Option<Instant>)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, (String, Option<Instant>)>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory cache mutex poisoned"))
    }
}

/// Drops expired entries. Keys of old cache generations are never read again.
fn sweep(entries: &mut HashMap<String, (String, Option<Instant>)>, now: Instant) {
    entries.retain(|_, (_, expires)| expires.map_or(true, |at| at > now));
}

#[async_trait]
impl CacheClient for MemoryCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut entries = self.lock()?;
        let expired = matches!(
            entries.get(key),
            Some((_, Some(expires))) if *expires <= Instant::now()
        );
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|(value, _)| value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> anyhow::Result<()> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        sweep(&mut entries, now);
        entries.insert(
            key.to_string(),
            (value.to_string(), Some(now + Duration::from_secs(ttl_secs))),
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> anyhow::Result<i64> {
        let mut entries = self.lock()?;
        sweep(&mut entries, Instant::now());
        let current = entries
            .get(key)
            .and_then(|(v, _)| v.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        entries.insert(key.to_string(), (next.to_string(), None));
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_cache_roundtrip() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("k").await.unwrap(), None);
        cache.set_ex("k", "v", 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn memory_cache_expires_entries() {
        let cache = MemoryCache::new();
        cache.set_ex("k", "v", 0).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_cache_counts() {
        let cache = MemoryCache::new();
        assert_eq!(cache.incr("gen").await.unwrap(), 1);
        assert_eq!(cache.incr("gen").await.unwrap(), 2);
        assert_eq!(cache.get("gen").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn stale_generations_are_dropped_without_being_read() {
        let cache = MemoryCache::new();
        for generation in 0..1000 {
            cache
                .set_ex(&format!("listings:{generation}:q"), "[]", 0)
                .await
                .unwrap();
            cache.incr("listings:gen").await.unwrap();
        }
        let entries = cache.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("listings:gen"));
    }
}
