//! Row lock management for the in-memory store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use wallet_common::{AccountId, LedgerError, Result};

use crate::config::LockConfig;

/// An exclusive lock on one balance row.
///
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub struct RowLock {
    /// Locked account.
    pub account_id: AccountId,
    /// When the lock was granted.
    pub acquired_at: Instant,
    _guard: OwnedMutexGuard<()>,
    held: Arc<AtomicU64>,
}

impl RowLock {
    /// Time the lock has been held so far.
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl Drop for RowLock {
    fn drop(&mut self) {
        self.held.fetch_sub(1, Ordering::Relaxed);
        debug!(account = %self.account_id, held_ms = self.held_for().as_millis() as u64, "Row lock released");
    }
}

/// Manager for per-account row locks.
pub struct LockManager {
    /// One mutex per account row, created on first use.
    rows: DashMap<AccountId, Arc<Mutex<()>>>,
    /// Locks currently held.
    held: Arc<AtomicU64>,
    /// Total locks granted.
    acquired: AtomicU64,
    /// Total acquisitions that timed out.
    timed_out: AtomicU64,
    /// Configuration.
    config: LockConfig,
}

impl LockManager {
    /// Create a new lock manager.
    pub fn new(config: LockConfig) -> Self {
        Self {
            rows: DashMap::new(),
            held: Arc::new(AtomicU64::new(0)),
            acquired: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            config,
        }
    }

    /// Acquire the row lock for `account_id`, waiting at most the
    /// configured acquire timeout.
    pub async fn acquire(&self, account_id: &AccountId) -> Result<RowLock> {
        let row = Arc::clone(&self.rows.entry(*account_id).or_default());

        match tokio::time::timeout(self.config.acquire_timeout, row.lock_owned()).await {
            Ok(guard) => {
                self.acquired.fetch_add(1, Ordering::Relaxed);
                self.held.fetch_add(1, Ordering::Relaxed);
                debug!(account = %account_id, "Row lock acquired");
                Ok(RowLock {
                    account_id: *account_id,
                    acquired_at: Instant::now(),
                    _guard: guard,
                    held: Arc::clone(&self.held),
                })
            }
            Err(_) => {
                self.timed_out.fetch_add(1, Ordering::Relaxed);
                warn!(
                    account = %account_id,
                    timeout_ms = self.config.acquire_timeout.as_millis() as u64,
                    "Row lock acquisition timed out"
                );
                Err(LedgerError::LockTimeout(*account_id))
            }
        }
    }

    /// Number of row locks currently held.
    pub fn held_count(&self) -> u64 {
        self.held.load(Ordering::Relaxed)
    }

    /// Total row locks granted.
    pub fn acquired_count(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }

    /// Total acquisitions that timed out.
    pub fn timeout_count(&self) -> u64 {
        self.timed_out.load(Ordering::Relaxed)
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(LockConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_lock_manager(timeout: Duration) -> LockManager {
        LockManager::new(LockConfig {
            acquire_timeout: timeout,
        })
    }

    #[tokio::test]
    async fn test_lock_acquire_and_release() {
        let manager = create_test_lock_manager(Duration::from_secs(1));
        let account = AccountId::new();

        let lock = manager.acquire(&account).await.unwrap();
        assert_eq!(lock.account_id, account);
        assert_eq!(manager.held_count(), 1);

        drop(lock);
        assert_eq!(manager.held_count(), 0);

        let _again = manager.acquire(&account).await.unwrap();
        assert_eq!(manager.acquired_count(), 2);
    }

    #[tokio::test]
    async fn test_lock_timeout() {
        let manager = create_test_lock_manager(Duration::from_millis(20));
        let account = AccountId::new();

        let _held = manager.acquire(&account).await.unwrap();
        let err = manager.acquire(&account).await.unwrap_err();

        assert_eq!(err, LedgerError::LockTimeout(account));
        assert_eq!(manager.timeout_count(), 1);
        assert_eq!(manager.held_count(), 1);
    }

    #[tokio::test]
    async fn test_distinct_rows_do_not_contend() {
        let manager = create_test_lock_manager(Duration::from_millis(20));

        let _a = manager.acquire(&AccountId::new()).await.unwrap();
        let _b = manager.acquire(&AccountId::new()).await.unwrap();
        assert_eq!(manager.held_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_waiter_gets_lock_after_release() {
        let manager = Arc::new(create_test_lock_manager(Duration::from_secs(2)));
        let account = AccountId::new();

        let first = manager.acquire(&account).await.unwrap();

        let waiter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.acquire(&account).await.map(|l| l.account_id) })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(first);

        assert_eq!(waiter.await.unwrap(), Ok(account));
    }
}
