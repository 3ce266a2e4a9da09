//! Distributed lock
//!
//! A lease on a key in a shared store. Ownership is proven by the value
//! written at acquisition; only the holder of that value can extend or
//! release the lease. Every operation fails closed: a backend error is
//! logged and reported as "not acquired", "not extended" or "not released".

mod backend;
mod postgres;

pub use backend::{LockBackend, MemoryLockBackend};
pub use postgres::PgLockBackend;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info};

/// A successfully acquired lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    pub key: String,
    pub value: String,
}

#[derive(Clone)]
pub struct DistributedLock {
    backend: Arc<dyn LockBackend>,
}

impl DistributedLock {
    pub fn new(backend: Arc<dyn LockBackend>) -> Self {
        Self { backend }
    }

    /// Single attempt to take `key` for `ttl`.
    ///
    /// Returns `None` when another holder owns the key or the backend failed.
    pub async fn acquire(&self, key: &str, ttl: Duration, value: Option<String>) -> Option<LockLease> {
        let value = value.unwrap_or_else(default_lock_value);

        match self.backend.try_acquire(key, &value, ttl).await {
            Ok(true) => {
                debug!(lock_key = %key, lock_value = %value, "Distributed lock acquired");
                Some(LockLease {
                    key: key.to_string(),
                    value,
                })
            },
            Ok(false) => {
                info!(lock_key = %key, "Distributed lock held elsewhere");
                None
            },
            Err(e) => {
                error!(lock_key = %key, error = %e, "Error acquiring distributed lock");
                None
            },
        }
    }

    /// Reset the TTL of `key`, checking ownership first when `expected_value` is given
    pub async fn extend(&self, key: &str, ttl: Duration, expected_value: Option<&str>) -> bool {
        match self.backend.extend(key, expected_value, ttl).await {
            Ok(extended) => {
                if !extended {
                    debug!(lock_key = %key, "Distributed lock not extended");
                }
                extended
            },
            Err(e) => {
                error!(lock_key = %key, error = %e, "Error extending distributed lock");
                false
            },
        }
    }

    /// Delete `key`, atomically checking ownership when `expected_value` is given
    pub async fn release(&self, key: &str, expected_value: Option<&str>) -> bool {
        match self.backend.release(key, expected_value).await {
            Ok(released) => {
                debug!(lock_key = %key, released, "Distributed lock release");
                released
            },
            Err(e) => {
                error!(lock_key = %key, error = %e, "Error releasing distributed lock");
                false
            },
        }
    }
}

/// `{hostname}-{pid}-{unix_millis}`
pub fn default_lock_value() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string());
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("{}-{}-{}", host, std::process::id(), millis)
}
