//! Per-key FIFO serialisation of async work.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Hands out one async lock per key.
///
/// Tokio's mutex is fair, so waiters for the same key are released in the
/// order they called [`Sequencer::acquire`]. Different keys never contend.
#[derive(Default)]
pub struct Sequencer {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

/// Held for as long as the caller owns the key.
pub type SequenceGuard = OwnedMutexGuard<()>;

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive ownership of `key`.
    pub async fn acquire(&self, key: Uuid) -> SequenceGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop idle entries; a count of one means only the map holds it.
            locks.retain(|k, lock| *k == key || Arc::strong_count(lock) > 1);
            locks.entry(key).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of keys currently tracked.
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_runs_in_submission_order() {
        let sequencer = Arc::new(Sequencer::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let key = Uuid::new_v4();

        let first = sequencer.acquire(key).await;
        let mut handles = Vec::new();
        for i in 0..5 {
            let sequencer = sequencer.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let _guard = sequencer.acquire(key).await;
                order.lock().unwrap().push(i);
            }));
            // Let each task queue up before the next is spawned.
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        drop(first);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let sequencer = Sequencer::new();
        let _a = sequencer.acquire(Uuid::new_v4()).await;
        let b = tokio::time::timeout(Duration::from_millis(50), sequencer.acquire(Uuid::new_v4())).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_idle_keys_are_pruned() {
        let sequencer = Sequencer::new();
        for _ in 0..10 {
            let _guard = sequencer.acquire(Uuid::new_v4()).await;
        }
        let _guard = sequencer.acquire(Uuid::new_v4()).await;
        assert_eq!(sequencer.tracked(), 1);
    }
}
