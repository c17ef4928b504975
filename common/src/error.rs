//! Error types for wallet ledger operations.

use crate::{AccountId, TransactionId};
use thiserror::Error;

/// Main error type for ledger operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Amount is zero or negative.
    #[error("{subject} amount must be greater than 0")]
    InvalidAmount { subject: &'static str },

    /// Amount carries more fractional digits than a balance can hold.
    #[error("Ensure that there are no more than {max} decimal places.")]
    TooManyDecimalPlaces { max: u32 },

    /// Amount exceeds what a balance column can hold.
    #[error("Ensure that there are no more than {max} digits in total.")]
    TooManyDigits { max: u32 },

    /// Applying the movement would push a balance past its limit.
    #[error("Balance limit exceeded for account {0}")]
    BalanceLimitExceeded(AccountId),

    /// Available balance does not cover the debit.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Sender and recipient of a P2P transfer are the same account.
    #[error("You cannot make p2p transfer to yourself")]
    SelfTransferNotAllowed,

    /// No balance exists for the account.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// A balance was already provisioned for the account.
    #[error("Account already exists: {0}")]
    AccountAlreadyExists(AccountId),

    /// The balance is deactivated and cannot move money.
    #[error("Account is inactive: {0}")]
    AccountInactive(AccountId),

    /// Transaction not found.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// Row lock could not be acquired in time.
    #[error("Timed out waiting for lock on account {0}")]
    LockTimeout(AccountId),

    /// Backing store failed or is unreachable.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Broken internal invariant.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::LockTimeout(_))
    }

    /// Check if this error is a rejected request rather than a failure.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidAmount { .. }
                | LedgerError::TooManyDecimalPlaces { .. }
                | LedgerError::TooManyDigits { .. }
                | LedgerError::BalanceLimitExceeded(_)
                | LedgerError::InsufficientFunds
                | LedgerError::SelfTransferNotAllowed
                | LedgerError::AccountInactive(_)
        )
    }

    /// Get error code for API responses and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount { .. } => "INVALID_AMOUNT",
            LedgerError::TooManyDecimalPlaces { .. } => "INVALID_AMOUNT",
            LedgerError::TooManyDigits { .. } => "INVALID_AMOUNT",
            LedgerError::BalanceLimitExceeded(_) => "BALANCE_LIMIT_EXCEEDED",
            LedgerError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            LedgerError::SelfTransferNotAllowed => "SELF_TRANSFER_NOT_ALLOWED",
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::AccountAlreadyExists(_) => "ACCOUNT_ALREADY_EXISTS",
            LedgerError::AccountInactive(_) => "ACCOUNT_INACTIVE",
            LedgerError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            LedgerError::LockTimeout(_) => "LOCK_TIMEOUT",
            LedgerError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            LedgerError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_messages() {
        assert_eq!(
            LedgerError::InvalidAmount { subject: "Deposit" }.to_string(),
            "Deposit amount must be greater than 0"
        );
        assert_eq!(LedgerError::InsufficientFunds.to_string(), "insufficient funds");
        assert_eq!(
            LedgerError::SelfTransferNotAllowed.to_string(),
            "You cannot make p2p transfer to yourself"
        );
    }

    #[test]
    fn test_only_lock_timeout_is_retryable() {
        assert!(LedgerError::LockTimeout(AccountId::new()).is_retryable());
        assert!(!LedgerError::InsufficientFunds.is_retryable());
        assert!(!LedgerError::StoreUnavailable("down".into()).is_retryable());
    }

    #[test]
    fn test_validation_classification() {
        assert!(LedgerError::SelfTransferNotAllowed.is_validation());
        assert!(LedgerError::TooManyDigits { max: 12 }.is_validation());
        assert!(LedgerError::BalanceLimitExceeded(AccountId::new()).is_validation());
        assert!(!LedgerError::AccountNotFound(AccountId::new()).is_validation());
        assert!(!LedgerError::LockTimeout(AccountId::new()).is_validation());
    }
}
