//! Wallet Service
//!
//! Caller-facing facade over the ledger engine. It authorizes every call
//! against the caller's own account and shapes results and failures the
//! way an HTTP layer hands them to clients.

pub mod api;
pub mod config;
pub mod service;

pub use api::{ApiError, DepositRequest, P2pTransferRequest, Receipt, TransactionView, WithdrawalRequest};
pub use config::ServiceConfig;
pub use service::WalletService;
