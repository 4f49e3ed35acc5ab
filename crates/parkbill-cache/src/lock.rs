//! Redis-backed distributed lock
//!
//! Serializes settlement and wallet mutations across service instances.
//! A lock is a Redis key holding a random token, created with SET NX EX so
//! acquisition and expiry are one atomic step. Release and extension compare
//! the stored token against the caller's inside a Lua script, so a holder
//! whose lock already expired can never delete or prolong someone else's.

use crate::{keys, EntryCache, RedisCache};
use async_trait::async_trait;
use parkbill_core::error::AppError;
use redis::Script;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// How often blocking acquisition re-attempts the SET NX
pub const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Compare-and-delete, atomic at the server
const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// Compare-and-expire, atomic at the server
const EXTEND_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("expire", KEYS[1], ARGV[2])
else
    return 0
end
"#;

/// Proof of lock ownership
///
/// Only the holder of the matching token can release or extend the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    resource: String,
    token: String,
}

impl LockToken {
    /// Build a token; lock implementations are responsible for uniqueness
    pub fn new(resource: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            token: token.into(),
        }
    }

    /// Resource the token guards
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

/// Resource locking operations.
///
/// Services are generic over this trait; [`DistributedLock`] is the
/// production Redis implementation.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Attempt to acquire the lock without waiting
    ///
    /// # Returns
    ///
    /// The ownership token, or `None` when the lock is held elsewhere
    async fn try_acquire(
        &self,
        resource: &str,
        ttl_secs: u64,
    ) -> Result<Option<LockToken>, AppError>;

    /// Acquire the lock, waiting until `max_wait` elapses
    ///
    /// # Errors
    ///
    /// Returns `AppError::LockNotAcquired` when the lock stays held for the
    /// whole wait window
    async fn acquire(
        &self,
        resource: &str,
        ttl_secs: u64,
        max_wait: Duration,
    ) -> Result<LockToken, AppError>;

    /// Release the lock if the token still owns it
    ///
    /// # Returns
    ///
    /// `Ok(true)` when this call released the lock, `Ok(false)` when the
    /// lock had already expired or was taken over
    async fn release(&self, token: &LockToken) -> Result<bool, AppError>;

    /// Push the expiry out if the token still owns the lock
    ///
    /// # Returns
    ///
    /// `Ok(true)` when the TTL was reset, `Ok(false)` when ownership was lost
    async fn extend(&self, token: &LockToken, ttl_secs: u64) -> Result<bool, AppError>;

    /// Run a closure while holding the lock
    ///
    /// Acquires with blocking semantics, runs `f`, then releases. The lock is
    /// released even when `f` fails; a failed release is logged and swallowed
    /// because the TTL reclaims the key anyway.
    ///
    /// # Errors
    ///
    /// Returns `AppError::LockNotAcquired` when the lock cannot be obtained
    /// within `max_wait`, otherwise whatever `f` returns
    async fn with_lock<F, Fut, T>(
        &self,
        resource: &str,
        ttl_secs: u64,
        max_wait: Duration,
        f: F,
    ) -> Result<T, AppError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, AppError>> + Send,
        T: Send,
    {
        let token = self.acquire(resource, ttl_secs, max_wait).await?;

        let result = f().await;

        if let Err(e) = self.release(&token).await {
            warn!("Failed to release lock on {}: {}", resource, e);
        }

        result
    }
}

/// Distributed lock service over a shared Redis connection
#[derive(Clone)]
pub struct DistributedLock {
    cache: RedisCache,
}

impl DistributedLock {
    pub fn new(cache: RedisCache) -> Self {
        Self { cache }
    }

    /// Whether any holder currently owns the resource
    pub async fn is_locked(&self, resource: &str) -> Result<bool, AppError> {
        self.cache.exists(&keys::lock_key(resource)).await
    }

    /// Seconds until the current hold expires, if held
    pub async fn remaining_ttl(&self, resource: &str) -> Result<Option<u64>, AppError> {
        let key = keys::lock_key(resource);
        let mut conn = self.cache.manager();

        let ttl: i64 = redis::cmd("TTL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(RedisCache::map_redis_error)?;

        if ttl >= 0 {
            Ok(Some(ttl as u64))
        } else {
            Ok(None)
        }
    }

    /// Delete the lock regardless of ownership
    ///
    /// Operator escape hatch for a wedged resource. Bypasses the token check.
    pub async fn force_release(&self, resource: &str) -> Result<bool, AppError> {
        warn!("Force-releasing lock on {}", resource);
        self.cache.evict(&keys::lock_key(resource)).await
    }
}

#[async_trait]
impl LockManager for DistributedLock {
    async fn try_acquire(
        &self,
        resource: &str,
        ttl_secs: u64,
    ) -> Result<Option<LockToken>, AppError> {
        let key = keys::lock_key(resource);
        let token = Uuid::new_v4().to_string();
        let mut conn = self.cache.manager();

        let acquired: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&token)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(RedisCache::map_redis_error)?;

        if acquired.is_some() {
            debug!("Acquired lock {} (TTL: {}s)", key, ttl_secs);
            Ok(Some(LockToken {
                resource: resource.to_string(),
                token,
            }))
        } else {
            debug!("Lock {} is held elsewhere", key);
            Ok(None)
        }
    }

    // Polls every ACQUIRE_POLL_INTERVAL until the deadline
    async fn acquire(
        &self,
        resource: &str,
        ttl_secs: u64,
        max_wait: Duration,
    ) -> Result<LockToken, AppError> {
        let deadline = tokio::time::Instant::now() + max_wait;

        loop {
            if let Some(token) = self.try_acquire(resource, ttl_secs).await? {
                return Ok(token);
            }
            if tokio::time::Instant::now() + ACQUIRE_POLL_INTERVAL > deadline {
                warn!("Gave up waiting for lock on {}", resource);
                return Err(AppError::LockNotAcquired(resource.to_string()));
            }
            tokio::time::sleep(ACQUIRE_POLL_INTERVAL).await;
        }
    }

    async fn release(&self, token: &LockToken) -> Result<bool, AppError> {
        let key = keys::lock_key(&token.resource);
        let mut conn = self.cache.manager();

        let deleted: i32 = Script::new(RELEASE_SCRIPT)
            .key(&key)
            .arg(&token.token)
            .invoke_async(&mut conn)
            .await
            .map_err(RedisCache::map_redis_error)?;

        if deleted > 0 {
            debug!("Released lock {}", key);
            Ok(true)
        } else {
            warn!("Lock {} was no longer held by this token", key);
            Ok(false)
        }
    }

    async fn extend(&self, token: &LockToken, ttl_secs: u64) -> Result<bool, AppError> {
        let key = keys::lock_key(&token.resource);
        let mut conn = self.cache.manager();

        let extended: i32 = Script::new(EXTEND_SCRIPT)
            .key(&key)
            .arg(&token.token)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(RedisCache::map_redis_error)?;

        Ok(extended > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_lock() -> DistributedLock {
        let cache = RedisCache::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");
        DistributedLock::new(cache)
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_try_acquire_and_release() {
        let lock = setup_lock().await;
        let resource = format!("test:{}", Uuid::new_v4());

        let token = lock.try_acquire(&resource, 10).await.unwrap();
        assert!(token.is_some());
        assert!(lock.is_locked(&resource).await.unwrap());

        // Second acquisition fails while held
        let second = lock.try_acquire(&resource, 10).await.unwrap();
        assert!(second.is_none());

        let released = lock.release(&token.unwrap()).await.unwrap();
        assert!(released);
        assert!(!lock.is_locked(&resource).await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_release_with_stale_token() {
        let lock = setup_lock().await;
        let resource = format!("test:{}", Uuid::new_v4());

        let first = lock.try_acquire(&resource, 10).await.unwrap().unwrap();
        lock.force_release(&resource).await.unwrap();

        // Someone else takes the lock
        let second = lock.try_acquire(&resource, 10).await.unwrap().unwrap();

        // The stale token must not release the new holder's lock
        let released = lock.release(&first).await.unwrap();
        assert!(!released);
        assert!(lock.is_locked(&resource).await.unwrap());

        lock.release(&second).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_extend() {
        let lock = setup_lock().await;
        let resource = format!("test:{}", Uuid::new_v4());

        let token = lock.try_acquire(&resource, 2).await.unwrap().unwrap();

        let extended = lock.extend(&token, 30).await.unwrap();
        assert!(extended);

        let ttl = lock.remaining_ttl(&resource).await.unwrap().unwrap();
        assert!(ttl > 2);

        lock.release(&token).await.unwrap();

        // Extending after release fails the token check
        let extended = lock.extend(&token, 30).await.unwrap();
        assert!(!extended);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_acquire_waits_for_release() {
        let lock = setup_lock().await;
        let resource = format!("test:{}", Uuid::new_v4());

        let token = lock.try_acquire(&resource, 10).await.unwrap().unwrap();

        let contender = lock.clone();
        let contender_resource = resource.clone();
        let handle = tokio::spawn(async move {
            contender
                .acquire(&contender_resource, 10, Duration::from_secs(5))
                .await
        });

        tokio::time::sleep(Duration::from_millis(300)).await;
        lock.release(&token).await.unwrap();

        let acquired = handle.await.unwrap();
        assert!(acquired.is_ok());
        lock.release(&acquired.unwrap()).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_acquire_times_out() {
        let lock = setup_lock().await;
        let resource = format!("test:{}", Uuid::new_v4());

        let token = lock.try_acquire(&resource, 30).await.unwrap().unwrap();

        let result = lock
            .acquire(&resource, 10, Duration::from_millis(300))
            .await;
        assert!(matches!(result, Err(AppError::LockNotAcquired(_))));

        lock.release(&token).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_with_lock_releases_on_error() {
        let lock = setup_lock().await;
        let resource = format!("test:{}", Uuid::new_v4());

        let result: Result<(), AppError> = lock
            .with_lock(&resource, 10, Duration::from_secs(1), || async {
                Err(AppError::Internal("boom".to_string()))
            })
            .await;
        assert!(result.is_err());

        // The lock was released despite the failure
        assert!(!lock.is_locked(&resource).await.unwrap());
    }
}
