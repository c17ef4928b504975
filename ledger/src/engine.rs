//! Core ledger engine implementation.
//!
//! The engine is the only component that mutates balances. Each operation
//! runs one atomic section on the store: lock the balances it touches,
//! re-check the business rules against the locked values, write the new
//! balances and append exactly one transaction record, then commit. Any
//! error before the commit rolls the whole section back.

use std::future::Future;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use wallet_common::{
    validate_amount, AccountId, BankAccountId, LedgerError, Result, TransactionId,
};

use crate::balance::Balance;
use crate::config::LedgerConfig;
use crate::metrics::{Metrics, SharedMetrics};
use crate::reference::ReferenceGenerator;
use crate::store::{LedgerStore, StoreTransaction};
use crate::transaction::{Transaction, TransactionKind};

/// The ledger engine orchestrates deposits, withdrawals and transfers.
pub struct LedgerEngine {
    /// Balance store and transaction log.
    store: Arc<dyn LedgerStore>,
    /// Reference generator for new records.
    references: ReferenceGenerator,
    /// Configuration.
    config: LedgerConfig,
    /// Operation metrics.
    metrics: SharedMetrics,
}

impl LedgerEngine {
    /// Create a new ledger engine over `store`.
    pub fn new(store: Arc<dyn LedgerStore>, config: LedgerConfig) -> Self {
        Self {
            store,
            references: ReferenceGenerator::new(),
            config,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Operation metrics.
    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// Provision the balance of a new account, starting at zero.
    #[instrument(skip(self))]
    pub async fn open_account(&self, account_id: AccountId) -> Result<Balance> {
        let balance = Balance::zero(account_id);
        self.store.create_balance(&balance).await?;
        info!(account = %account_id, "Account balance provisioned");
        Ok(balance)
    }

    /// Activate or deactivate a balance.
    #[instrument(skip(self))]
    pub async fn set_active(&self, account_id: AccountId, active: bool) -> Result<Balance> {
        self.with_retry("set_active", move || self.try_set_active(account_id, active))
            .await
    }

    /// Credit `amount` to an account.
    #[instrument(skip(self), fields(amount = %amount))]
    pub async fn deposit(&self, account_id: AccountId, amount: Decimal) -> Result<Transaction> {
        let amount = self.validated(amount, "Deposit")?;
        let result = self
            .with_retry("deposit", move || self.try_deposit(account_id, amount))
            .await;
        self.record_outcome(result)
    }

    /// Debit `amount` from an account.
    #[instrument(skip(self), fields(amount = %amount))]
    pub async fn withdraw(&self, account_id: AccountId, amount: Decimal) -> Result<Transaction> {
        let amount = self.validated(amount, "Withdrawal")?;
        let result = self
            .with_retry("withdraw", move || {
                self.try_debit(account_id, amount, TransactionKind::Withdrawal)
            })
            .await;
        self.record_outcome(result)
    }

    /// Pay `amount` out of an account to an external bank account.
    #[instrument(skip(self), fields(amount = %amount))]
    pub async fn bank_transfer(
        &self,
        account_id: AccountId,
        bank_account: BankAccountId,
        amount: Decimal,
    ) -> Result<Transaction> {
        let amount = self.validated(amount, "Transfer")?;
        let kind = TransactionKind::BankTransfer { bank_account };
        let result = self
            .with_retry("bank_transfer", move || {
                self.try_debit(account_id, amount, kind)
            })
            .await;
        self.record_outcome(result)
    }

    /// Move `amount` from `sender` to `recipient`.
    ///
    /// Exactly one transaction record is created, owned by the sender.
    #[instrument(skip(self), fields(amount = %amount))]
    pub async fn p2p_transfer(
        &self,
        sender: AccountId,
        recipient: AccountId,
        amount: Decimal,
    ) -> Result<Transaction> {
        let amount = self.validated(amount, "Transfer")?;
        if sender == recipient {
            self.metrics.rejected();
            return Err(LedgerError::SelfTransferNotAllowed);
        }

        let result = self
            .with_retry("p2p_transfer", move || {
                self.try_p2p_transfer(sender, recipient, amount)
            })
            .await;
        self.record_outcome(result)
    }

    /// Last committed balance of an account.
    pub async fn balance(&self, account_id: AccountId) -> Result<Balance> {
        self.store.get_balance(&account_id).await
    }

    /// Transaction history of an account, oldest first.
    pub async fn transactions(&self, owner: AccountId) -> Result<Vec<Transaction>> {
        self.store.list_transactions(&owner).await
    }

    /// A single transaction record.
    pub async fn transaction(&self, id: TransactionId) -> Result<Transaction> {
        self.store.get_transaction(&id).await
    }

    fn validated(&self, amount: Decimal, subject: &'static str) -> Result<Decimal> {
        validate_amount(amount, subject).map_err(|e| {
            self.metrics.rejected();
            e
        })
    }

    fn record_outcome(&self, result: Result<Transaction>) -> Result<Transaction> {
        match &result {
            Ok(transaction) => self.metrics.committed(&transaction.kind),
            Err(e) if e.is_validation() => self.metrics.rejected(),
            Err(_) => self.metrics.failed(),
        }
        result
    }

    /// Run an atomic section, retrying it after lock timeouts.
    ///
    /// A timed-out attempt has already rolled back, so running the whole
    /// section again cannot apply anything twice.
    async fn with_retry<T, F, Fut>(&self, operation: &'static str, attempt: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(LedgerError::LockTimeout(account)) => {
                    self.metrics.lock_timeout();
                    if retries >= self.config.max_lock_retries {
                        warn!(operation, account = %account, retries, "Giving up after lock timeouts");
                        return Err(LedgerError::LockTimeout(account));
                    }
                    retries += 1;
                    self.metrics.lock_retry();
                    warn!(operation, account = %account, retries, "Lock timeout, retrying");
                    tokio::time::sleep(self.config.retry_backoff * retries).await;
                }
                other => return other,
            }
        }
    }

    async fn try_set_active(&self, account_id: AccountId, active: bool) -> Result<Balance> {
        let mut tx = self.store.begin().await?;
        let mut balance = tx.lock_for_update(&account_id).await?;
        balance.active = active;
        balance.updated_at = chrono::Utc::now();
        tx.save(&balance).await?;
        tx.commit().await?;

        info!(account = %account_id, active, "Account activity changed");
        Ok(balance)
    }

    async fn try_deposit(&self, account_id: AccountId, amount: Decimal) -> Result<Transaction> {
        let mut tx = self.store.begin().await?;
        let mut balance = tx.lock_for_update(&account_id).await?;
        if !balance.active {
            return abort(tx, LedgerError::AccountInactive(account_id)).await;
        }

        if let Err(e) = balance.credit(amount) {
            warn!(account = %account_id, "Deposit rejected: balance limit");
            return abort(tx, e).await;
        }
        tx.save(&balance).await?;

        let record = self.record(account_id, TransactionKind::Deposit, amount, &balance);
        tx.append(&record).await?;
        tx.commit().await?;

        info!(
            account = %account_id,
            reference = %record.reference,
            new_balance = %record.new_balance,
            "Deposit committed"
        );
        Ok(record)
    }

    async fn try_debit(
        &self,
        account_id: AccountId,
        amount: Decimal,
        kind: TransactionKind,
    ) -> Result<Transaction> {
        // Cheap rejection before taking any lock.
        let current = self.store.get_balance(&account_id).await?;
        if !current.has_sufficient_funds(amount) {
            warn!(account = %account_id, "Debit rejected: insufficient funds");
            return Err(LedgerError::InsufficientFunds);
        }

        let mut tx = self.store.begin().await?;
        let mut balance = tx.lock_for_update(&account_id).await?;
        if !balance.active {
            return abort(tx, LedgerError::AccountInactive(account_id)).await;
        }
        // The balance may have moved since the unlocked read.
        if !balance.has_sufficient_funds(amount) {
            warn!(account = %account_id, "Debit rejected under lock: insufficient funds");
            return abort(tx, LedgerError::InsufficientFunds).await;
        }

        if let Err(e) = balance.debit(amount) {
            return abort(tx, e).await;
        }
        tx.save(&balance).await?;

        let record = self.record(account_id, kind, amount, &balance);
        tx.append(&record).await?;
        tx.commit().await?;

        info!(
            account = %account_id,
            kind = kind.tag(),
            reference = %record.reference,
            new_balance = %record.new_balance,
            "Debit committed"
        );
        Ok(record)
    }

    async fn try_p2p_transfer(
        &self,
        sender: AccountId,
        recipient: AccountId,
        amount: Decimal,
    ) -> Result<Transaction> {
        let current = self.store.get_balance(&sender).await?;
        self.store.get_balance(&recipient).await?;
        if !current.has_sufficient_funds(amount) {
            warn!(sender = %sender, "Transfer rejected: insufficient funds");
            return Err(LedgerError::InsufficientFunds);
        }

        let mut tx = self.store.begin().await?;

        // Lock in account id order regardless of direction, so A->B and
        // B->A running together cannot wait on each other.
        let (first, second) = if sender < recipient {
            (sender, recipient)
        } else {
            (recipient, sender)
        };
        let first_balance = tx.lock_for_update(&first).await?;
        let second_balance = tx.lock_for_update(&second).await?;
        let (mut from, mut to) = if first == sender {
            (first_balance, second_balance)
        } else {
            (second_balance, first_balance)
        };

        if !from.active {
            return abort(tx, LedgerError::AccountInactive(sender)).await;
        }
        if !to.active {
            return abort(tx, LedgerError::AccountInactive(recipient)).await;
        }
        if !from.has_sufficient_funds(amount) {
            warn!(sender = %sender, "Transfer rejected under lock: insufficient funds");
            return abort(tx, LedgerError::InsufficientFunds).await;
        }

        if let Err(e) = from.debit(amount).and_then(|()| to.credit(amount)) {
            warn!(sender = %sender, recipient = %recipient, error = %e, "Transfer rejected under lock");
            return abort(tx, e).await;
        }
        tx.save(&from).await?;
        tx.save(&to).await?;

        let record = self.record(
            sender,
            TransactionKind::P2pTransfer { sender, recipient },
            amount,
            &from,
        );
        tx.append(&record).await?;
        tx.commit().await?;

        info!(
            sender = %sender,
            recipient = %recipient,
            reference = %record.reference,
            new_balance = %record.new_balance,
            "P2P transfer committed"
        );
        Ok(record)
    }

    fn record(
        &self,
        owner: AccountId,
        kind: TransactionKind,
        amount: Decimal,
        balance: &Balance,
    ) -> Transaction {
        Transaction::complete(
            self.references.generate(kind.record_name()),
            owner,
            kind,
            amount,
            balance.available_balance,
        )
    }
}

/// Roll back `tx` and fail with `err`.
async fn abort<T>(tx: Box<dyn StoreTransaction>, err: LedgerError) -> Result<T> {
    tx.rollback().await?;
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockConfig;
    use crate::memory::MemoryStore;
    use rust_decimal_macros::dec;
    use wallet_common::MAX_AMOUNT;
    use std::time::Duration;

    fn create_test_engine() -> (LedgerEngine, MemoryStore) {
        let store = MemoryStore::with_lock_config(LockConfig {
            acquire_timeout: Duration::from_secs(2),
        });
        let engine = LedgerEngine::new(Arc::new(store.clone()), LedgerConfig::default());
        (engine, store)
    }

    async fn funded_account(engine: &LedgerEngine, amount: Decimal) -> AccountId {
        let account = AccountId::new();
        engine.open_account(account).await.unwrap();
        if amount > Decimal::ZERO {
            engine.deposit(account, amount).await.unwrap();
        }
        account
    }

    #[tokio::test]
    async fn test_walkthrough() {
        let (engine, store) = create_test_engine();
        let account = funded_account(&engine, dec!(100)).await;
        let other = funded_account(&engine, Decimal::ZERO).await;

        let deposit = engine.deposit(account, dec!(100)).await.unwrap();
        let balance = engine.balance(account).await.unwrap();
        assert_eq!(balance.available_balance, dec!(200.00));
        assert_eq!(balance.book_balance, dec!(200.00));
        assert_eq!(deposit.kind, TransactionKind::Deposit);
        assert_eq!(deposit.amount, dec!(100));
        assert_eq!(deposit.new_balance, dec!(200.00));
        assert!(deposit.reference.starts_with("Deposit"));

        let withdrawal = engine.withdraw(account, dec!(10)).await.unwrap();
        assert_eq!(withdrawal.new_balance, dec!(190.00));
        assert!(withdrawal.reference.starts_with("Withdrawal"));

        let before = store.transaction_count();
        let transfer = engine.p2p_transfer(account, other, dec!(70)).await.unwrap();
        assert_eq!(store.transaction_count(), before + 1);
        assert_eq!(
            transfer.kind,
            TransactionKind::P2pTransfer {
                sender: account,
                recipient: other
            }
        );
        assert_eq!(transfer.owner, account);
        assert_eq!(transfer.new_balance, dec!(120.00));
        assert!(transfer.reference.starts_with("P2ptransfer"));

        let sender = engine.balance(account).await.unwrap();
        let recipient = engine.balance(other).await.unwrap();
        assert_eq!(sender.available_balance, dec!(120.00));
        assert_eq!(sender.book_balance, dec!(120.00));
        assert_eq!(recipient.available_balance, dec!(70.00));
        assert_eq!(recipient.book_balance, dec!(70.00));

        // The recipient does not own a record of the transfer.
        assert!(engine.transactions(other).await.unwrap().is_empty());
        assert_eq!(engine.transactions(account).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_deposit_then_withdraw_restores_balance() {
        let (engine, _) = create_test_engine();
        let account = funded_account(&engine, dec!(42.17)).await;

        engine.deposit(account, dec!(13.50)).await.unwrap();
        engine.withdraw(account, dec!(13.50)).await.unwrap();

        assert_eq!(engine.balance(account).await.unwrap().available_balance, dec!(42.17));
    }

    #[tokio::test]
    async fn test_non_positive_amounts_rejected() {
        let (engine, store) = create_test_engine();
        let account = funded_account(&engine, dec!(50)).await;
        let other = funded_account(&engine, Decimal::ZERO).await;
        let records = store.transaction_count();

        for amount in [Decimal::ZERO, dec!(-1), dec!(-0.01)] {
            assert_eq!(
                engine.deposit(account, amount).await.unwrap_err(),
                LedgerError::InvalidAmount { subject: "Deposit" }
            );
            assert_eq!(
                engine.withdraw(account, amount).await.unwrap_err(),
                LedgerError::InvalidAmount { subject: "Withdrawal" }
            );
            assert_eq!(
                engine.p2p_transfer(account, other, amount).await.unwrap_err(),
                LedgerError::InvalidAmount { subject: "Transfer" }
            );
        }

        assert_eq!(engine.balance(account).await.unwrap().available_balance, dec!(50));
        assert_eq!(engine.balance(other).await.unwrap().available_balance, Decimal::ZERO);
        assert_eq!(store.transaction_count(), records);
        assert_eq!(engine.metrics().snapshot().rejected, 9);
    }

    #[tokio::test]
    async fn test_sub_cent_amount_rejected() {
        let (engine, _) = create_test_engine();
        let account = funded_account(&engine, Decimal::ZERO).await;
        assert_eq!(
            engine.deposit(account, dec!(0.001)).await.unwrap_err(),
            LedgerError::TooManyDecimalPlaces { max: 2 }
        );
    }

    #[tokio::test]
    async fn test_withdraw_more_than_available() {
        let (engine, store) = create_test_engine();
        let account = funded_account(&engine, dec!(100)).await;
        let records = store.transaction_count();

        assert_eq!(
            engine.withdraw(account, dec!(101)).await.unwrap_err(),
            LedgerError::InsufficientFunds
        );
        assert_eq!(engine.balance(account).await.unwrap().available_balance, dec!(100));
        assert_eq!(store.transaction_count(), records);

        // Exactly the available balance is fine.
        let record = engine.withdraw(account, dec!(100)).await.unwrap();
        assert_eq!(record.new_balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_self_transfer_rejected() {
        let (engine, _) = create_test_engine();
        let account = funded_account(&engine, dec!(100)).await;

        assert_eq!(
            engine.p2p_transfer(account, account, dec!(10)).await.unwrap_err(),
            LedgerError::SelfTransferNotAllowed
        );
        assert_eq!(engine.balance(account).await.unwrap().available_balance, dec!(100));
    }

    #[tokio::test]
    async fn test_transfer_insufficient_funds() {
        let (engine, _) = create_test_engine();
        let sender = funded_account(&engine, dec!(100)).await;
        let recipient = funded_account(&engine, Decimal::ZERO).await;

        assert_eq!(
            engine.p2p_transfer(sender, recipient, dec!(110)).await.unwrap_err(),
            LedgerError::InsufficientFunds
        );
        assert_eq!(engine.balance(sender).await.unwrap().available_balance, dec!(100));
        assert_eq!(engine.balance(recipient).await.unwrap().available_balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_missing_accounts() {
        let (engine, _) = create_test_engine();
        let account = funded_account(&engine, dec!(10)).await;
        let missing = AccountId::new();

        assert_eq!(
            engine.deposit(missing, dec!(1)).await.unwrap_err(),
            LedgerError::AccountNotFound(missing)
        );
        assert_eq!(
            engine.withdraw(missing, dec!(1)).await.unwrap_err(),
            LedgerError::AccountNotFound(missing)
        );
        assert_eq!(
            engine.p2p_transfer(account, missing, dec!(1)).await.unwrap_err(),
            LedgerError::AccountNotFound(missing)
        );
        assert_eq!(engine.balance(account).await.unwrap().available_balance, dec!(10));
    }

    #[tokio::test]
    async fn test_open_account_twice() {
        let (engine, _) = create_test_engine();
        let account = funded_account(&engine, Decimal::ZERO).await;
        assert_eq!(
            engine.open_account(account).await.unwrap_err(),
            LedgerError::AccountAlreadyExists(account)
        );
    }

    #[tokio::test]
    async fn test_inactive_accounts_cannot_move_money() {
        let (engine, _) = create_test_engine();
        let sender = funded_account(&engine, dec!(100)).await;
        let recipient = funded_account(&engine, Decimal::ZERO).await;

        engine.set_active(recipient, false).await.unwrap();
        assert_eq!(
            engine.p2p_transfer(sender, recipient, dec!(5)).await.unwrap_err(),
            LedgerError::AccountInactive(recipient)
        );
        assert_eq!(
            engine.deposit(recipient, dec!(5)).await.unwrap_err(),
            LedgerError::AccountInactive(recipient)
        );
        assert_eq!(engine.balance(sender).await.unwrap().available_balance, dec!(100));

        engine.set_active(recipient, true).await.unwrap();
        engine.p2p_transfer(sender, recipient, dec!(5)).await.unwrap();
        assert_eq!(engine.balance(recipient).await.unwrap().available_balance, dec!(5));
    }

    #[tokio::test]
    async fn test_bank_transfer() {
        let (engine, _) = create_test_engine();
        let account = funded_account(&engine, dec!(80)).await;
        let bank_account = BankAccountId::new();

        let record = engine.bank_transfer(account, bank_account, dec!(30)).await.unwrap();
        assert_eq!(record.kind, TransactionKind::BankTransfer { bank_account });
        assert_eq!(record.new_balance, dec!(50.00));
        assert!(record.reference.starts_with("Banktransfer"));

        assert_eq!(
            engine.bank_transfer(account, bank_account, dec!(51)).await.unwrap_err(),
            LedgerError::InsufficientFunds
        );
        assert_eq!(engine.metrics().snapshot().bank_transfers, 1);
    }

    #[tokio::test]
    async fn test_transaction_lookup() {
        let (engine, _) = create_test_engine();
        let account = funded_account(&engine, dec!(5)).await;

        let history = engine.transactions(account).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(engine.transaction(history[0].id).await.unwrap(), history[0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_deposits_are_not_lost() {
        let (engine, _) = create_test_engine();
        let engine = Arc::new(engine);
        let account = funded_account(&engine, dec!(10)).await;

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.deposit(account, dec!(2.50)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let balance = engine.balance(account).await.unwrap();
        assert_eq!(balance.available_balance, dec!(260.00));
        assert_eq!(balance.book_balance, dec!(260.00));
        assert_eq!(engine.transactions(account).await.unwrap().len(), 101);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_opposite_transfers_do_not_deadlock() {
        let (engine, store) = create_test_engine();
        let engine = Arc::new(engine);
        let a = funded_account(&engine, dec!(1000)).await;
        let b = funded_account(&engine, dec!(1000)).await;

        let handles: Vec<_> = (0..200)
            .map(|i| {
                let engine = Arc::clone(&engine);
                let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
                tokio::spawn(async move { engine.p2p_transfer(from, to, dec!(3)).await })
            })
            .collect();

        let all = tokio::time::timeout(Duration::from_secs(30), async {
            for handle in handles {
                handle.await.unwrap().unwrap();
            }
        })
        .await;
        assert!(all.is_ok(), "opposite transfers did not finish");

        let total = engine.balance(a).await.unwrap().available_balance
            + engine.balance(b).await.unwrap().available_balance;
        assert_eq!(total, dec!(2000));
        assert_eq!(engine.balance(a).await.unwrap().available_balance, dec!(1000));
        assert_eq!(store.lock_manager().held_count(), 0);
        assert_eq!(engine.metrics().snapshot().lock_timeouts, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_withdrawals_never_overdraw() {
        let (engine, _) = create_test_engine();
        let engine = Arc::new(engine);
        let account = funded_account(&engine, dec!(100)).await;

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.withdraw(account, dec!(7)).await })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(e) => assert_eq!(e, LedgerError::InsufficientFunds),
            }
        }

        assert_eq!(succeeded, 14);
        assert_eq!(engine.balance(account).await.unwrap().available_balance, dec!(2.00));
    }

    #[tokio::test]
    async fn test_lock_timeout_is_retried_then_surfaced() {
        let store = MemoryStore::with_lock_config(LockConfig {
            acquire_timeout: Duration::from_millis(10),
        });
        let config = LedgerConfig {
            max_lock_retries: 2,
            retry_backoff: Duration::from_millis(1),
            ..LedgerConfig::default()
        };
        let engine = LedgerEngine::new(Arc::new(store.clone()), config);
        let account = funded_account(&engine, dec!(10)).await;

        // Hold the row lock from outside the engine.
        let mut blocker = store.begin().await.unwrap();
        blocker.lock_for_update(&account).await.unwrap();

        assert_eq!(
            engine.deposit(account, dec!(1)).await.unwrap_err(),
            LedgerError::LockTimeout(account)
        );
        let snapshot = engine.metrics().snapshot();
        assert_eq!(snapshot.lock_timeouts, 3);
        assert_eq!(snapshot.lock_retries, 2);
        assert_eq!(snapshot.failed, 1);

        blocker.rollback().await.unwrap();
        engine.deposit(account, dec!(1)).await.unwrap();
        assert_eq!(engine.balance(account).await.unwrap().available_balance, dec!(11));
    }

    #[tokio::test]
    async fn test_amount_above_limit_rejected() {
        let (engine, store) = create_test_engine();
        let account = funded_account(&engine, Decimal::ZERO).await;
        let huge = Decimal::from_i128_with_scale(50_000_000_000_000_000_000_000_000_000, 2);

        for _ in 0..60 {
            assert_eq!(
                engine.deposit(account, huge).await.unwrap_err(),
                LedgerError::TooManyDigits { max: 12 }
            );
        }
        assert_eq!(engine.balance(account).await.unwrap().available_balance, Decimal::ZERO);
        assert_eq!(store.transaction_count(), 0);
        assert_eq!(engine.metrics().snapshot().rejected, 60);
    }

    #[tokio::test]
    async fn test_credit_past_balance_limit_rolls_back() {
        let (engine, store) = create_test_engine();
        let account = funded_account(&engine, MAX_AMOUNT).await;
        let sender = funded_account(&engine, dec!(10)).await;
        let records = store.transaction_count();

        assert_eq!(
            engine.deposit(account, dec!(0.01)).await.unwrap_err(),
            LedgerError::BalanceLimitExceeded(account)
        );
        assert_eq!(
            engine.p2p_transfer(sender, account, dec!(1)).await.unwrap_err(),
            LedgerError::BalanceLimitExceeded(account)
        );

        let full = engine.balance(account).await.unwrap();
        assert_eq!(full.available_balance, dec!(9999999999.99));
        assert_eq!(full.book_balance, full.available_balance);
        assert_eq!(full.available_balance.scale(), 2);
        assert_eq!(engine.balance(sender).await.unwrap().available_balance, dec!(10));
        assert_eq!(store.transaction_count(), records);
        assert_eq!(store.lock_manager().held_count(), 0);
        assert_eq!(engine.metrics().snapshot().rejected, 2);

        // Room frees up once the balance is spent down.
        engine.withdraw(account, dec!(1)).await.unwrap();
        engine.p2p_transfer(sender, account, dec!(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_transfer_timing_out_on_second_lock_changes_nothing() {
        let store = MemoryStore::with_lock_config(LockConfig {
            acquire_timeout: Duration::from_millis(10),
        });
        let config = LedgerConfig {
            max_lock_retries: 1,
            retry_backoff: Duration::from_millis(1),
            ..LedgerConfig::default()
        };
        let engine = LedgerEngine::new(Arc::new(store.clone()), config);
        let a = funded_account(&engine, dec!(50)).await;
        let b = funded_account(&engine, dec!(50)).await;
        let (lower, higher) = if a < b { (a, b) } else { (b, a) };
        let records = store.transaction_count();

        // The engine gets the lower id first, then waits on this one.
        let mut blocker = store.begin().await.unwrap();
        blocker.lock_for_update(&higher).await.unwrap();

        for (sender, recipient) in [(lower, higher), (higher, lower)] {
            assert_eq!(
                engine.p2p_transfer(sender, recipient, dec!(20)).await.unwrap_err(),
                LedgerError::LockTimeout(higher)
            );
        }
        assert_eq!(store.lock_manager().held_count(), 1);

        blocker.rollback().await.unwrap();
        assert_eq!(store.lock_manager().held_count(), 0);
        assert_eq!(engine.balance(lower).await.unwrap().available_balance, dec!(50));
        assert_eq!(engine.balance(higher).await.unwrap().available_balance, dec!(50));
        assert_eq!(store.transaction_count(), records);
        assert_eq!(engine.metrics().snapshot().failed, 2);

        engine.p2p_transfer(lower, higher, dec!(20)).await.unwrap();
        assert_eq!(engine.balance(higher).await.unwrap().available_balance, dec!(70));
    }
}
