//! Wallet Ledger Engine
//!
//! Balance store, append-only transaction log and the engine that moves
//! money between them atomically.

pub mod balance;
pub mod config;
pub mod engine;
pub mod lock_manager;
pub mod memory;
pub mod metrics;
pub mod postgres;
pub mod reference;
pub mod store;
pub mod transaction;

pub use balance::Balance;
pub use config::{LedgerConfig, LockConfig};
pub use engine::LedgerEngine;
pub use lock_manager::{LockManager, RowLock};
pub use memory::MemoryStore;
pub use metrics::{Metrics, MetricsSnapshot, SharedMetrics};
pub use postgres::PostgresStore;
pub use reference::ReferenceGenerator;
pub use store::{BalanceStore, LedgerStore, StoreTransaction, TransactionLog};
pub use transaction::{Transaction, TransactionKind, TransactionStatus};
