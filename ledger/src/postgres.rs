//! PostgreSQL ledger store.
//!
//! Row locks are real `SELECT ... FOR UPDATE` locks held by a `sqlx`
//! transaction; the wait is bounded with `SET LOCAL lock_timeout`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row};
use tracing::{debug, info};
use uuid::Uuid;

use wallet_common::{AccountId, BankAccountId, LedgerError, Result, TransactionId};

use crate::balance::Balance;
use crate::config::LockConfig;
use crate::store::{BalanceStore, LedgerStore, StoreTransaction, TransactionLog};
use crate::transaction::{Transaction, TransactionKind};

const LOCK_NOT_AVAILABLE: &str = "55P03";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";

const BALANCE_COLUMNS: &str =
    "account_id, book_balance, available_balance, active, created_at, updated_at";
const TRANSACTION_COLUMNS: &str = "id, reference, owner_id, kind, status, amount, new_balance, \
     sender_id, recipient_id, bank_account_id, created_at";

fn store_error(e: sqlx::Error) -> LedgerError {
    LedgerError::StoreUnavailable(e.to_string())
}

fn sqlstate(e: &sqlx::Error) -> Option<String> {
    match e {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// Map a failure of a locking statement, turning lock waits that gave up
/// into the retryable `LockTimeout`.
fn lock_error(e: sqlx::Error, account_id: &AccountId) -> LedgerError {
    match sqlstate(&e).as_deref() {
        Some(LOCK_NOT_AVAILABLE) | Some(DEADLOCK_DETECTED) => LedgerError::LockTimeout(*account_id),
        _ => store_error(e),
    }
}

fn balance_from_row(row: &PgRow) -> Result<Balance> {
    Ok(Balance {
        account_id: AccountId::from_uuid(row.try_get("account_id").map_err(store_error)?),
        book_balance: row.try_get("book_balance").map_err(store_error)?,
        available_balance: row.try_get("available_balance").map_err(store_error)?,
        active: row.try_get("active").map_err(store_error)?,
        created_at: row.try_get("created_at").map_err(store_error)?,
        updated_at: row.try_get("updated_at").map_err(store_error)?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction> {
    let kind_tag: String = row.try_get("kind").map_err(store_error)?;
    let sender: Option<Uuid> = row.try_get("sender_id").map_err(store_error)?;
    let recipient: Option<Uuid> = row.try_get("recipient_id").map_err(store_error)?;
    let bank_account: Option<Uuid> = row.try_get("bank_account_id").map_err(store_error)?;

    let kind = match (kind_tag.as_str(), sender, recipient, bank_account) {
        ("deposit", ..) => TransactionKind::Deposit,
        ("withdrawal", ..) => TransactionKind::Withdrawal,
        ("p2p_transfer", Some(sender), Some(recipient), _) => TransactionKind::P2pTransfer {
            sender: AccountId::from_uuid(sender),
            recipient: AccountId::from_uuid(recipient),
        },
        ("bank_transfer", _, _, Some(bank_account)) => TransactionKind::BankTransfer {
            bank_account: BankAccountId::from_uuid(bank_account),
        },
        (other, ..) => {
            return Err(LedgerError::Internal(format!(
                "malformed transaction row of kind {}",
                other
            )))
        }
    };

    let status: String = row.try_get("status").map_err(store_error)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(store_error)?;
    let amount: Decimal = row.try_get("amount").map_err(store_error)?;
    let new_balance: Decimal = row.try_get("new_balance").map_err(store_error)?;

    Ok(Transaction {
        id: TransactionId::from_uuid(row.try_get("id").map_err(store_error)?),
        reference: row.try_get("reference").map_err(store_error)?,
        owner: AccountId::from_uuid(row.try_get("owner_id").map_err(store_error)?),
        kind,
        status: status.parse()?,
        amount,
        new_balance,
        created_at,
    })
}

/// Ledger store backed by PostgreSQL.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStore {
    /// Connect to `database_url` with a pool of at most `max_connections`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        lock_config: &LockConfig,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(store_error)?;

        info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::from_pool(pool, lock_config))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool, lock_config: &LockConfig) -> Self {
        Self {
            pool,
            lock_timeout: lock_config.acquire_timeout,
        }
    }

    /// Create the ledger tables if they do not exist yet.
    pub async fn init_schema(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wallet_balances (
                account_id UUID PRIMARY KEY,
                book_balance NUMERIC(12, 2) NOT NULL DEFAULT 0 CHECK (book_balance >= 0),
                available_balance NUMERIC(12, 2) NOT NULL DEFAULT 0 CHECK (available_balance >= 0),
                active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wallet_transactions (
                id UUID PRIMARY KEY,
                reference TEXT NOT NULL UNIQUE,
                owner_id UUID NOT NULL REFERENCES wallet_balances(account_id),
                kind TEXT NOT NULL
                    CHECK (kind IN ('deposit', 'withdrawal', 'p2p_transfer', 'bank_transfer')),
                status TEXT NOT NULL,
                amount NUMERIC(12, 2) NOT NULL CHECK (amount > 0),
                new_balance NUMERIC(12, 2) NOT NULL,
                sender_id UUID REFERENCES wallet_balances(account_id),
                recipient_id UUID REFERENCES wallet_balances(account_id),
                bank_account_id UUID,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_wallet_transactions_owner
            ON wallet_transactions(owner_id, created_at)
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;

        info!("Ledger schema initialized");
        Ok(())
    }
}

#[async_trait]
impl BalanceStore for PostgresStore {
    async fn create_balance(&self, balance: &Balance) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO wallet_balances
                (account_id, book_balance, available_balance, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(balance.account_id.as_uuid())
        .bind(balance.book_balance)
        .bind(balance.available_balance)
        .bind(balance.active)
        .bind(balance.created_at)
        .bind(balance.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match sqlstate(&e).as_deref() {
            Some(UNIQUE_VIOLATION) => LedgerError::AccountAlreadyExists(balance.account_id),
            _ => store_error(e),
        })?;

        Ok(())
    }

    async fn get_balance(&self, account_id: &AccountId) -> Result<Balance> {
        let query = format!(
            "SELECT {} FROM wallet_balances WHERE account_id = $1",
            BALANCE_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(account_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .ok_or(LedgerError::AccountNotFound(*account_id))?;

        balance_from_row(&row)
    }
}

#[async_trait]
impl TransactionLog for PostgresStore {
    async fn get_transaction(&self, id: &TransactionId) -> Result<Transaction> {
        let query = format!(
            "SELECT {} FROM wallet_transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .ok_or(LedgerError::TransactionNotFound(*id))?;

        transaction_from_row(&row)
    }

    async fn list_transactions(&self, owner: &AccountId) -> Result<Vec<Transaction>> {
        let query = format!(
            "SELECT {} FROM wallet_transactions WHERE owner_id = $1 ORDER BY created_at, id",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(owner.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        rows.iter().map(transaction_from_row).collect()
    }
}

#[async_trait]
impl LedgerStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        // SET does not take bind parameters.
        let statement = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis().max(1)
        );
        sqlx::query(&statement)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        Ok(Box::new(PostgresTransaction {
            tx,
            locked: Vec::new(),
        }))
    }
}

/// Atomic section backed by a PostgreSQL transaction.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
    locked: Vec<AccountId>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn lock_for_update(&mut self, account_id: &AccountId) -> Result<Balance> {
        let query = format!(
            "SELECT {} FROM wallet_balances WHERE account_id = $1 FOR UPDATE",
            BALANCE_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(account_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| lock_error(e, account_id))?
            .ok_or(LedgerError::AccountNotFound(*account_id))?;

        if !self.locked.contains(account_id) {
            self.locked.push(*account_id);
        }
        debug!(account = %account_id, "Row locked");
        balance_from_row(&row)
    }

    async fn save(&mut self, balance: &Balance) -> Result<()> {
        if !self.locked.contains(&balance.account_id) {
            return Err(LedgerError::Internal(format!(
                "balance {} saved without holding its row lock",
                balance.account_id
            )));
        }

        sqlx::query(
            r#"
            UPDATE wallet_balances
            SET book_balance = $2, available_balance = $3, active = $4, updated_at = $5
            WHERE account_id = $1
            "#,
        )
        .bind(balance.account_id.as_uuid())
        .bind(balance.book_balance)
        .bind(balance.available_balance)
        .bind(balance.active)
        .bind(balance.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn append(&mut self, transaction: &Transaction) -> Result<()> {
        let (sender, recipient, bank_account) = match &transaction.kind {
            TransactionKind::P2pTransfer { sender, recipient } => {
                (Some(*sender.as_uuid()), Some(*recipient.as_uuid()), None)
            }
            TransactionKind::BankTransfer { bank_account } => {
                (None, None, Some(*bank_account.as_uuid()))
            }
            TransactionKind::Deposit | TransactionKind::Withdrawal => (None, None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO wallet_transactions
                (id, reference, owner_id, kind, status, amount, new_balance,
                 sender_id, recipient_id, bank_account_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(&transaction.reference)
        .bind(transaction.owner.as_uuid())
        .bind(transaction.kind.tag())
        .bind(transaction.status.as_str())
        .bind(transaction.amount)
        .bind(transaction.new_balance)
        .bind(sender)
        .bind(recipient)
        .bind(bank_account)
        .bind(transaction.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(store_error)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(store_error)
    }
}
