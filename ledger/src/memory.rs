//! In-memory ledger store.
//!
//! Committed state sits behind one read/write lock so that a commit makes
//! its balance updates and transaction records visible in a single step.
//! Row locks are separate async mutexes managed by [`LockManager`]; plain
//! reads never wait on them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use wallet_common::{AccountId, LedgerError, Result, TransactionId};

use crate::balance::Balance;
use crate::config::LockConfig;
use crate::lock_manager::{LockManager, RowLock};
use crate::store::{BalanceStore, LedgerStore, StoreTransaction, TransactionLog};
use crate::transaction::Transaction;

#[derive(Default)]
struct Committed {
    balances: HashMap<AccountId, Balance>,
    transactions: Vec<Transaction>,
    by_id: HashMap<TransactionId, usize>,
    by_owner: HashMap<AccountId, Vec<usize>>,
    references: HashMap<String, TransactionId>,
}

impl Committed {
    fn push_transaction(&mut self, transaction: Transaction) {
        let index = self.transactions.len();
        self.by_id.insert(transaction.id, index);
        self.by_owner.entry(transaction.owner).or_default().push(index);
        self.references
            .insert(transaction.reference.clone(), transaction.id);
        self.transactions.push(transaction);
    }
}

/// Ledger store kept entirely in process memory.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<Committed>>,
    locks: Arc<LockManager>,
}

impl MemoryStore {
    /// Create an empty store with default lock settings.
    pub fn new() -> Self {
        Self::with_lock_config(LockConfig::default())
    }

    /// Create an empty store with the given lock settings.
    pub fn with_lock_config(config: LockConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(Committed::default())),
            locks: Arc::new(LockManager::new(config)),
        }
    }

    /// Row lock manager backing this store.
    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    /// Number of committed transaction records.
    pub fn transaction_count(&self) -> usize {
        self.state.read().transactions.len()
    }

    /// Sum of all committed available balances.
    pub fn total_available(&self) -> rust_decimal::Decimal {
        self.state
            .read()
            .balances
            .values()
            .map(|b| b.available_balance)
            .sum()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BalanceStore for MemoryStore {
    async fn create_balance(&self, balance: &Balance) -> Result<()> {
        let mut state = self.state.write();
        if state.balances.contains_key(&balance.account_id) {
            return Err(LedgerError::AccountAlreadyExists(balance.account_id));
        }
        state.balances.insert(balance.account_id, balance.clone());
        Ok(())
    }

    async fn get_balance(&self, account_id: &AccountId) -> Result<Balance> {
        self.state
            .read()
            .balances
            .get(account_id)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(*account_id))
    }
}

#[async_trait]
impl TransactionLog for MemoryStore {
    async fn get_transaction(&self, id: &TransactionId) -> Result<Transaction> {
        let state = self.state.read();
        state
            .by_id
            .get(id)
            .map(|&index| state.transactions[index].clone())
            .ok_or(LedgerError::TransactionNotFound(*id))
    }

    async fn list_transactions(&self, owner: &AccountId) -> Result<Vec<Transaction>> {
        let state = self.state.read();
        Ok(state
            .by_owner
            .get(owner)
            .map(|indexes| {
                indexes
                    .iter()
                    .map(|&index| state.transactions[index].clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            locks: Arc::clone(&self.locks),
            held: HashMap::new(),
            staged_balances: HashMap::new(),
            staged_transactions: Vec::new(),
        }))
    }
}

/// Atomic section over a [`MemoryStore`].
pub struct MemoryTransaction {
    state: Arc<RwLock<Committed>>,
    locks: Arc<LockManager>,
    held: HashMap<AccountId, RowLock>,
    staged_balances: HashMap<AccountId, Balance>,
    staged_transactions: Vec<Transaction>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_for_update(&mut self, account_id: &AccountId) -> Result<Balance> {
        if self.held.contains_key(account_id) {
            if let Some(staged) = self.staged_balances.get(account_id) {
                return Ok(staged.clone());
            }
        } else {
            let exists = self.state.read().balances.contains_key(account_id);
            if !exists {
                return Err(LedgerError::AccountNotFound(*account_id));
            }
            let lock = self.locks.acquire(account_id).await?;
            self.held.insert(*account_id, lock);
        }

        // Read after the lock is held so no other section can commit
        // between this read and our own commit.
        self.state
            .read()
            .balances
            .get(account_id)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(*account_id))
    }

    async fn save(&mut self, balance: &Balance) -> Result<()> {
        if !self.held.contains_key(&balance.account_id) {
            return Err(LedgerError::Internal(format!(
                "balance {} saved without holding its row lock",
                balance.account_id
            )));
        }
        self.staged_balances
            .insert(balance.account_id, balance.clone());
        Ok(())
    }

    async fn append(&mut self, transaction: &Transaction) -> Result<()> {
        self.staged_transactions.push(transaction.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction {
            state,
            held,
            staged_balances,
            staged_transactions,
            ..
        } = *self;

        {
            let mut state = state.write();

            {
                let mut ids = HashSet::new();
                let mut references = HashSet::new();
                for transaction in &staged_transactions {
                    if state.by_id.contains_key(&transaction.id)
                        || state.references.contains_key(&transaction.reference)
                        || !ids.insert(transaction.id)
                        || !references.insert(transaction.reference.as_str())
                    {
                        return Err(LedgerError::Internal(format!(
                            "duplicate transaction {} ({})",
                            transaction.id, transaction.reference
                        )));
                    }
                }
            }

            for (account_id, balance) in staged_balances {
                state.balances.insert(account_id, balance);
            }
            for transaction in staged_transactions {
                state.push_transaction(transaction);
            }
        }

        debug!(locks = held.len(), "Memory transaction committed");
        drop(held);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        debug!(
            locks = self.held.len(),
            discarded = self.staged_transactions.len(),
            "Memory transaction rolled back"
        );
        Ok(())
    }
}
