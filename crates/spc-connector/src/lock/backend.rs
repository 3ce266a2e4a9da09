use crate::error::LockError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Atomic primitives a lock store has to provide
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Set `key` to `value` with `ttl` only if no live entry exists
    async fn try_acquire(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, LockError>;

    /// Reset the TTL of a live entry, only when its value matches if one is given
    async fn extend(&self, key: &str, value: Option<&str>, ttl: Duration) -> Result<bool, LockError>;

    /// Delete the entry, only when its value matches if one is given
    async fn release(&self, key: &str, value: Option<&str>) -> Result<bool, LockError>;
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process lock store for tests and single-instance deployments
#[derive(Default)]
pub struct MemoryLockBackend {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryLockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>, LockError> {
        self.entries
            .lock()
            .map_err(|_| LockError::Unavailable("lock table poisoned".to_string()))
    }

    /// Current holder of `key`, if the entry is still live
    pub fn holder(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries()
            .ok()?
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
    }
}

#[async_trait]
impl LockBackend for MemoryLockBackend {
    async fn try_acquire(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, LockError> {
        let now = Instant::now();
        let mut entries = self.entries()?;

        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn extend(&self, key: &str, value: Option<&str>, ttl: Duration) -> Result<bool, LockError> {
        let now = Instant::now();
        let mut entries = self.entries()?;

        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) && value.map_or(true, |v| v == entry.value) => {
                entry.expires_at = now + ttl;
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn release(&self, key: &str, value: Option<&str>) -> Result<bool, LockError> {
        let mut entries = self.entries()?;

        let owned = match (entries.get(key), value) {
            (Some(entry), Some(v)) => entry.value == v,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if owned {
            entries.remove(key);
        }
        Ok(owned)
    }
}
