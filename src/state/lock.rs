//! Run locking for exclusive engine access.
//!
//! Only one operation may run against an engine at a time. Entering an
//! operation acquires the engine's [`RunLock`]; the returned [`RunGuard`]
//! releases it when dropped, on every exit path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;
use uuid::Uuid;

use crate::error::StateError;

/// Information about a held run lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Unique lock identifier.
    pub lock_id: String,
    /// Who holds the lock.
    pub holder: String,
    /// Operation holding the lock.
    pub operation: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
}

/// Exclusive run token of an engine.
#[derive(Debug, Clone)]
pub struct RunLock {
    permits: Arc<Semaphore>,
    current: Arc<Mutex<Option<LockInfo>>>,
}

/// Proof that the run lock is held. Releases the lock on drop.
#[derive(Debug)]
pub struct RunGuard {
    info: LockInfo,
    current: Arc<Mutex<Option<LockInfo>>>,
    _permit: OwnedSemaphorePermit,
}

impl LockInfo {
    /// Creates a new lock info.
    #[must_use]
    pub fn new(holder: &str, operation: &str) -> Self {
        Self {
            lock_id: Uuid::new_v4().to_string(),
            holder: holder.to_string(),
            operation: operation.to_string(),
            acquired_at: Utc::now(),
        }
    }

    /// Returns how long the lock has been held, in milliseconds.
    #[must_use]
    pub fn held_for_ms(&self) -> i64 {
        (Utc::now() - self.acquired_at).num_milliseconds().max(0)
    }
}

impl Default for RunLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLock {
    /// Creates an unlocked run lock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Waits until the lock is free and acquires it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock has been shut down.
    pub async fn acquire(&self, operation: &str) -> Result<RunGuard, StateError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| StateError::LockFailed {
                message: e.to_string(),
            })?;
        Ok(self.guard(permit, operation))
    }

    /// Acquires the lock if it is free.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::LockedByOther`] if another operation holds it.
    pub fn try_acquire(&self, operation: &str) -> Result<RunGuard, StateError> {
        match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => Ok(self.guard(permit, operation)),
            Err(_) => {
                let (holder, since) = self.holder().map_or_else(
                    || (String::from("unknown"), String::from("unknown")),
                    |info| (info.holder, info.acquired_at.to_rfc3339()),
                );
                Err(StateError::LockedByOther { holder, since })
            }
        }
    }

    /// Returns the current holder, if any.
    #[must_use]
    pub fn holder(&self) -> Option<LockInfo> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns true if the lock is currently held.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.permits.available_permits() == 0
    }

    fn guard(&self, permit: OwnedSemaphorePermit, operation: &str) -> RunGuard {
        let info = LockInfo::new(&generate_holder_id(), operation);
        debug!("Run lock {} acquired for {}", info.lock_id, operation);
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(info.clone());
        RunGuard {
            info,
            current: Arc::clone(&self.current),
            _permit: permit,
        }
    }
}

impl RunGuard {
    /// Gets the lock info.
    #[must_use]
    pub const fn info(&self) -> &LockInfo {
        &self.info
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
        debug!(
            "Run lock {} released after {}ms",
            self.info.lock_id,
            self.info.held_for_ms()
        );
    }
}

/// Generates a unique holder identifier for the current process.
#[must_use]
pub fn generate_holder_id() -> String {
    let hostname = hostname::get().map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().to_string());

    let pid = std::process::id();
    let uuid = &Uuid::new_v4().to_string()[..8];

    format!("{hostname}-{pid}-{uuid}")
}
