//! Metrics collection for ledger monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::transaction::TransactionKind;

/// Ledger metrics.
#[derive(Debug)]
pub struct Metrics {
    /// Committed deposits.
    pub deposits: AtomicU64,
    /// Committed withdrawals.
    pub withdrawals: AtomicU64,
    /// Committed P2P transfers.
    pub p2p_transfers: AtomicU64,
    /// Committed bank transfers.
    pub bank_transfers: AtomicU64,
    /// Operations rejected by validation.
    pub rejected: AtomicU64,
    /// Operations that failed for other reasons.
    pub failed: AtomicU64,
    /// Lock timeouts observed (including retried ones).
    pub lock_timeouts: AtomicU64,
    /// Retries after a lock timeout.
    pub lock_retries: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            deposits: AtomicU64::new(0),
            withdrawals: AtomicU64::new(0),
            p2p_transfers: AtomicU64::new(0),
            bank_transfers: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            lock_timeouts: AtomicU64::new(0),
            lock_retries: AtomicU64::new(0),
        }
    }

    /// Record a committed movement.
    pub fn committed(&self, kind: &TransactionKind) {
        let counter = match kind {
            TransactionKind::Deposit => &self.deposits,
            TransactionKind::Withdrawal => &self.withdrawals,
            TransactionKind::P2pTransfer { .. } => &self.p2p_transfers,
            TransactionKind::BankTransfer { .. } => &self.bank_transfers,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected operation.
    pub fn rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed operation.
    pub fn failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a lock timeout.
    pub fn lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a retry.
    pub fn lock_retry(&self) {
        self.lock_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            deposits: self.deposits.load(Ordering::Relaxed),
            withdrawals: self.withdrawals.load(Ordering::Relaxed),
            p2p_transfers: self.p2p_transfers.load(Ordering::Relaxed),
            bank_transfers: self.bank_transfers.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            lock_retries: self.lock_retries.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP wallet_transactions_total Committed movements by kind
# TYPE wallet_transactions_total counter
wallet_transactions_total{{kind="deposit"}} {}
wallet_transactions_total{{kind="withdrawal"}} {}
wallet_transactions_total{{kind="p2p_transfer"}} {}
wallet_transactions_total{{kind="bank_transfer"}} {}

# HELP wallet_operations_rejected_total Operations rejected by validation
# TYPE wallet_operations_rejected_total counter
wallet_operations_rejected_total {}

# HELP wallet_operations_failed_total Operations failed by store or lock errors
# TYPE wallet_operations_failed_total counter
wallet_operations_failed_total {}

# HELP wallet_lock_timeouts_total Row lock acquisitions that timed out
# TYPE wallet_lock_timeouts_total counter
wallet_lock_timeouts_total {}

# HELP wallet_lock_retries_total Operations retried after a lock timeout
# TYPE wallet_lock_retries_total counter
wallet_lock_retries_total {}
"#,
            snapshot.deposits,
            snapshot.withdrawals,
            snapshot.p2p_transfers,
            snapshot.bank_transfers,
            snapshot.rejected,
            snapshot.failed,
            snapshot.lock_timeouts,
            snapshot.lock_retries,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub deposits: u64,
    pub withdrawals: u64,
    pub p2p_transfers: u64,
    pub bank_transfers: u64,
    pub rejected: u64,
    pub failed: u64,
    pub lock_timeouts: u64,
    pub lock_retries: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;
