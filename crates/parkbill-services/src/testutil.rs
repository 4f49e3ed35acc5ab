//! In-memory doubles for the cache and lock seams
//!
//! Behave like the Redis implementations minus TTLs: entries live until
//! evicted, locks are plain mutual exclusion. Entries hold the same JSON
//! `Option<T>` envelope as the real cache so absence markers round-trip.

use async_trait::async_trait;
use parkbill_cache::{CacheOutcome, EntryCache, LockManager, LockToken};
use parkbill_core::AppError;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Map-backed cache
#[derive(Default)]
pub struct MapCache {
    entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl EntryCache for MapCache {
    async fn get_entry<T: DeserializeOwned + Send>(
        &self,
        key: &str,
    ) -> Result<CacheOutcome<T>, AppError> {
        let entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(json) => match serde_json::from_str::<Option<T>>(json)? {
                Some(v) => Ok(CacheOutcome::Hit(v)),
                None => Ok(CacheOutcome::Absent),
            },
            None => Ok(CacheOutcome::Miss),
        }
    }

    async fn put<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        _ttl_secs: u64,
    ) -> Result<(), AppError> {
        let json = serde_json::to_string(&Some(value))?;
        self.entries.lock().unwrap().insert(key.to_string(), json);
        Ok(())
    }

    async fn put_absent(&self, key: &str, _ttl_secs: u64) -> Result<(), AppError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), "null".to_string());
        Ok(())
    }

    async fn evict(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.entries.lock().unwrap().remove(key).is_some())
    }

    async fn evict_pattern(&self, pattern: &str) -> Result<u64, AppError> {
        let prefix = pattern.trim_end_matches('*');
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }
}

/// Map-backed mutual exclusion
#[derive(Default)]
pub struct MapLock {
    held: Mutex<HashSet<String>>,
    counter: AtomicU64,
}

#[async_trait]
impl LockManager for MapLock {
    async fn try_acquire(
        &self,
        resource: &str,
        _ttl_secs: u64,
    ) -> Result<Option<LockToken>, AppError> {
        let mut held = self.held.lock().unwrap();
        if held.insert(resource.to_string()) {
            let token = self.counter.fetch_add(1, Ordering::Relaxed);
            Ok(Some(LockToken::new(resource, token.to_string())))
        } else {
            Ok(None)
        }
    }

    // No polling; a held lock in a single-threaded test is a deadlock anyway
    async fn acquire(
        &self,
        resource: &str,
        ttl_secs: u64,
        _max_wait: Duration,
    ) -> Result<LockToken, AppError> {
        self.try_acquire(resource, ttl_secs)
            .await?
            .ok_or_else(|| AppError::LockNotAcquired(resource.to_string()))
    }

    async fn release(&self, token: &LockToken) -> Result<bool, AppError> {
        Ok(self.held.lock().unwrap().remove(token.resource()))
    }

    async fn extend(&self, token: &LockToken, _ttl_secs: u64) -> Result<bool, AppError> {
        Ok(self.held.lock().unwrap().contains(token.resource()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_map_cache_absence_marker() {
        let cache = MapCache::default();

        assert_eq!(cache.get_entry::<i64>("k").await.unwrap(), CacheOutcome::Miss);

        cache.put_absent("k", 60).await.unwrap();
        assert_eq!(
            cache.get_entry::<i64>("k").await.unwrap(),
            CacheOutcome::Absent
        );

        cache.put("k", &7_i64, 60).await.unwrap();
        assert_eq!(
            cache.get_entry::<i64>("k").await.unwrap(),
            CacheOutcome::Hit(7)
        );
    }

    #[tokio::test]
    async fn test_map_cache_pattern_eviction() {
        let cache = MapCache::default();
        cache.put("charge:site:1", &1_i64, 60).await.unwrap();
        cache.put("charge:site:2", &2_i64, 60).await.unwrap();
        cache.put("other:3", &3_i64, 60).await.unwrap();

        assert_eq!(cache.evict_pattern("charge:*").await.unwrap(), 2);
        assert_eq!(
            cache.get_entry::<i64>("other:3").await.unwrap(),
            CacheOutcome::Hit(3)
        );
    }

    #[tokio::test]
    async fn test_map_lock_mutual_exclusion() {
        let lock = MapLock::default();

        let token = lock.try_acquire("r", 10).await.unwrap().unwrap();
        assert!(lock.try_acquire("r", 10).await.unwrap().is_none());

        assert!(lock.release(&token).await.unwrap());
        assert!(lock.try_acquire("r", 10).await.unwrap().is_some());
    }
}
