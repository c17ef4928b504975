//! Storage seams used by the ledger engine.
//!
//! A store exposes unlocked reads of balances and transactions, and opens
//! atomic sections ([`StoreTransaction`]) in which balances are locked,
//! mutated and recorded. Everything written inside one atomic section
//! becomes visible together on commit, or not at all.

use async_trait::async_trait;
use wallet_common::{AccountId, Result, TransactionId};

use crate::balance::Balance;
use crate::transaction::Transaction;

/// Durable storage of account balances.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Persist a freshly provisioned balance.
    ///
    /// Fails with `AccountAlreadyExists` if the account already has one.
    async fn create_balance(&self, balance: &Balance) -> Result<()>;

    /// Read the last committed balance without locking it.
    async fn get_balance(&self, account_id: &AccountId) -> Result<Balance>;
}

/// Append-only log of transaction records.
#[async_trait]
pub trait TransactionLog: Send + Sync {
    /// Fetch one record by id.
    async fn get_transaction(&self, id: &TransactionId) -> Result<Transaction>;

    /// All records owned by `owner`, oldest first.
    async fn list_transactions(&self, owner: &AccountId) -> Result<Vec<Transaction>>;
}

/// A store able to run atomic ledger sections.
#[async_trait]
pub trait LedgerStore: BalanceStore + TransactionLog {
    /// Open a new atomic section.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;
}

/// One atomic section over the balance store and the transaction log.
///
/// Row locks taken by [`lock_for_update`](Self::lock_for_update) are held
/// until the section ends. Dropping the section without committing rolls
/// it back.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Lock a balance for update and return its current value.
    ///
    /// Blocks until the lock is granted, failing with `LockTimeout` when the
    /// configured wait elapses and `AccountNotFound` when no balance exists.
    /// Locking the same account twice in one section returns the value as
    /// last saved in this section.
    async fn lock_for_update(&mut self, account_id: &AccountId) -> Result<Balance>;

    /// Stage the new value of a balance locked by this section.
    async fn save(&mut self, balance: &Balance) -> Result<()>;

    /// Stage a transaction record.
    async fn append(&mut self, transaction: &Transaction) -> Result<()>;

    /// Make every staged change visible and release the locks.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every staged change and release the locks.
    async fn rollback(self: Box<Self>) -> Result<()>;
}
