//! Per-entity keyed lock table. Locks are
//! in-memory `tokio::sync::Mutex`es local to this process; acquiring them
//! in sorted-id order within a single transaction avoids deadlock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct LockTable {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockTable {
    #[must_use]
    pub fn new() -> Self {
        LockTable::default()
    }

    async fn lock_for(&self, entity_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(entity_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquires locks for every id in `sorted_ids` (caller must pass them
    /// pre-sorted) and returns the guards, held until dropped at the end
    /// of the caller's transaction.
    pub async fn acquire_all(&self, sorted_ids: &[String]) -> Vec<OwnedMutexGuard<()>> {
        let mut guards = Vec::with_capacity(sorted_ids.len());
        for id in sorted_ids {
            let lock = self.lock_for(id).await;
            guards.push(lock.lock_owned().await);
        }
        guards
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_transactions_on_distinct_entities_do_not_block() {
        let table = Arc::new(LockTable::new());
        let t1 = table.clone();
        let t2 = table.clone();
        let a = tokio::spawn(async move {
            let _guards = t1.acquire_all(&["a".to_string()]).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        });
        let b = tokio::spawn(async move {
            let _guards = t2.acquire_all(&["b".to_string()]).await;
        });
        let (r1, r2) = tokio::join!(a, b);
        r1.unwrap();
        r2.unwrap();
    }

    #[tokio::test]
    async fn same_entity_is_serialised() {
        let table = Arc::new(LockTable::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let t1 = table.clone();
        let o1 = order.clone();
        let t2 = table.clone();
        let o2 = order.clone();
        let a = tokio::spawn(async move {
            let _guards = t1.acquire_all(&["shared".to_string()]).await;
            tokio::time::sleep(Duration::from_millis(10)).await;
            o1.lock().await.push(1);
        });
        tokio::time::sleep(Duration::from_millis(2)).await;
        let b = tokio::spawn(async move {
            let _guards = t2.acquire_all(&["shared".to_string()]).await;
            o2.lock().await.push(2);
        });
        let (r1, r2) = tokio::join!(a, b);
        r1.unwrap();
        r2.unwrap();
        assert_eq!(*order.lock().await, vec![1, 2]);
    }
}
