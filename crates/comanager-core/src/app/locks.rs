//! Per-task locks.
//!
//! Used as the engine's driver registry (`try_lock`: at most one execution
//! unit per task) and for single-flight report generation and retry (`lock`).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::TaskId;

#[derive(Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<Mutex<HashMap<TaskId, Arc<Mutex<()>>>>>,
}

/// Held while the task's lock is owned. Dropping it releases the lock.
pub struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, key: TaskId) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().await;
        // Entries nobody holds or waits on are dropped on the way.
        map.retain(|k, m| *k == key || Arc::strong_count(m) > 1);
        map.entry(key).or_default().clone()
    }

    /// Wait for the lock on `key`.
    pub async fn lock(&self, key: TaskId) -> KeyGuard {
        let slot = self.slot(key).await;
        KeyGuard {
            _guard: slot.lock_owned().await,
        }
    }

    /// Take the lock on `key` only if it is free.
    pub async fn try_lock(&self, key: TaskId) -> Option<KeyGuard> {
        let slot = self.slot(key).await;
        slot.try_lock_owned().ok().map(|guard| KeyGuard { _guard: guard })
    }

    #[cfg(test)]
    pub(crate) async fn tracked(&self) -> usize {
        self.inner.lock().await.len()
    }
}
