//! Per-record async locks
//!
//! A DashMap entry lock cannot be held across an `.await`, but the logical
//! operations that talk to a payment provider (handle creation, refunds)
//! must stay mutually exclusive per record across that network call — two
//! refunds of the same transaction must never both reach the provider.
//! This registry hands out one `tokio::sync::Mutex` per transaction id for
//! exactly those critical sections. Different records never contend.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::TransactionId;

/// Registry of per-record async mutexes
///
/// Entries are created on first use and kept for the life of the engine;
/// one small allocation per record that ever saw a provider call.
#[derive(Debug, Default)]
pub struct RecordLocks {
    locks: DashMap<TransactionId, Arc<Mutex<()>>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `id`, waiting if another operation on the same
    /// record is in flight
    pub async fn acquire(&self, id: TransactionId) -> OwnedMutexGuard<()> {
        let lock = {
            // The entry guard is dropped before awaiting the mutex.
            let entry = self.locks.entry(id).or_default();
            Arc::clone(entry.value())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_same_record_is_serialized() {
        let locks = Arc::new(RecordLocks::new());
        let id = Uuid::new_v4();
        let in_section = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut tasks = vec![];
        for _ in 0..16 {
            let locks = Arc::clone(&locks);
            let in_section = Arc::clone(&in_section);
            let max_seen = Arc::clone(&max_seen);
            tasks.push(tokio::spawn(async move {
                let _guard = locks.acquire(id).await;
                let now = in_section.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_section.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_records_do_not_block() {
        let locks = RecordLocks::new();
        let first = locks.acquire(Uuid::new_v4()).await;
        // A second record's lock must be immediately available.
        let second = locks.acquire(Uuid::new_v4()).await;
        drop(first);
        drop(second);
    }
}
