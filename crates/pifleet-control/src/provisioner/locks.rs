//! Per-device registration locks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Keyed async mutexes; one registration per device id at a time.
///
/// Entries nobody holds or waits on are pruned on the next acquisition.
#[derive(Clone, Default)]
pub struct DeviceLocks {
    locks: Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>,
}

impl DeviceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `device_id`.
    pub async fn lock(&self, device_id: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.write().await;
            locks.retain(|_, m| Arc::strong_count(m) > 1);
            Arc::clone(locks.entry(device_id.to_string()).or_default())
        };
        entry.lock_owned().await
    }

    /// Number of device ids with a live lock entry.
    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.read().await.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_id_is_exclusive() {
        let locks = DeviceLocks::new();
        let guard = locks.lock("pi01").await;

        let contender = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = contender.lock("pi01").await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_ids_do_not_block() {
        let locks = DeviceLocks::new();
        let _a = locks.lock("pi01").await;
        tokio::time::timeout(Duration::from_millis(200), locks.lock("pi02"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn released_entries_are_pruned() {
        let locks = DeviceLocks::new();
        drop(locks.lock("pi01").await);
        drop(locks.lock("pi02").await);
        // Acquiring pi03 prunes the released pi01/pi02 entries.
        let _g = locks.lock("pi03").await;
        assert_eq!(locks.len().await, 1);
    }
}
