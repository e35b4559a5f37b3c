// Keyed redemption locks
//
// Serializes redemption attempts that could observe each other's writes:
// attempts on the same code, and attempts of one main account under one
// promotion. Scope is the current process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// What a redemption lock protects
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey {
    /// Every instance carrying a normalized code
    Code(String),
    /// Usage of one main account under one promotion
    Account { account_id: i64, promotion_id: i64 },
}

/// Async locks keyed by [`LockKey`]
#[derive(Debug, Default)]
pub struct RedemptionLocks {
    locks: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl RedemptionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    /// The lock is released when the returned guard is dropped.
    pub async fn acquire(&self, key: LockKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries only referenced by the map have no holder or waiter left
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        lock.lock_owned().await
    }

    /// Acquire the code lock, then the account lock.
    /// Callers always take both in this order, so two attempts cannot deadlock.
    pub async fn acquire_redemption(
        &self,
        code: &str,
        account_id: i64,
        promotion_id: i64,
    ) -> Vec<OwnedMutexGuard<()>> {
        let code_guard = self.acquire(LockKey::Code(code.to_string())).await;
        let account_guard = self
            .acquire(LockKey::Account {
                account_id,
                promotion_id,
            })
            .await;
        vec![code_guard, account_guard]
    }

    /// Number of keys currently tracked
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}
