//! Request, response and error shapes of the wallet service.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use wallet_common::{AccountId, LedgerError};
use wallet_ledger::{Transaction, TransactionStatus};

/// Deposit into the caller's account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    pub account_id: AccountId,
    pub amount: Decimal,
}

/// Withdraw from the caller's account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub account_id: AccountId,
    pub amount: Decimal,
}

/// Send money from the caller's account to another account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct P2pTransferRequest {
    pub sender_account_id: AccountId,
    pub recipient_account_id: AccountId,
    pub amount: Decimal,
}

/// Outcome of a successful money movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    /// Always `complete`.
    pub status: TransactionStatus,
    pub amount: Decimal,
    /// Human readable kind, e.g. `p2p transfer`.
    pub transaction_type: &'static str,
    /// Status code of the created resource.
    #[serde(skip)]
    pub status_code: u16,
}

impl Receipt {
    /// Status code for a created transaction.
    pub const CREATED: u16 = 201;

    pub(crate) fn from_transaction(transaction: &Transaction) -> Self {
        Self {
            status: transaction.status,
            amount: transaction.amount,
            transaction_type: transaction.kind.display_name(),
            status_code: Self::CREATED,
        }
    }
}

/// A transaction record as shown to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub transaction_type: &'static str,
}

impl From<Transaction> for TransactionView {
    fn from(transaction: Transaction) -> Self {
        let transaction_type = transaction.kind.display_name();
        Self {
            transaction,
            transaction_type,
        }
    }
}

/// Failure returned to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{status} {code}: {message}")]
pub struct ApiError {
    /// HTTP-equivalent status code.
    pub status: u16,
    /// Stable machine readable code.
    pub code: &'static str,
    /// User facing message.
    pub message: String,
    /// Whether the same request may succeed if sent again.
    pub retryable: bool,
}

impl ApiError {
    pub const BAD_REQUEST: u16 = 400;
    pub const FORBIDDEN: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const CONFLICT: u16 = 409;
    pub const INTERNAL: u16 = 500;
    pub const UNAVAILABLE: u16 = 503;

    /// The caller is not the owner of the account it acts on.
    pub fn permission_denied() -> Self {
        Self {
            status: Self::FORBIDDEN,
            code: "PERMISSION_DENIED",
            message: "You do not have permission to perform this action.".to_string(),
            retryable: false,
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match &err {
            e if e.is_validation() => Self::BAD_REQUEST,
            LedgerError::AccountNotFound(_) | LedgerError::TransactionNotFound(_) => Self::NOT_FOUND,
            LedgerError::AccountAlreadyExists(_) => Self::CONFLICT,
            LedgerError::LockTimeout(_) => Self::UNAVAILABLE,
            _ => Self::INTERNAL,
        };

        // Store and invariant failures are not described to callers.
        let message = if status == Self::INTERNAL {
            "Internal server error".to_string()
        } else {
            err.to_string()
        };

        Self {
            status,
            code: err.error_code(),
            message,
            retryable: err.is_retryable(),
        }
    }
}
