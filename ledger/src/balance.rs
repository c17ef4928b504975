//! Account balance tracking.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use wallet_common::{to_scale, AccountId, LedgerError, Result, MAX_AMOUNT};

/// Current balance of one account.
///
/// `book_balance` and `available_balance` move in lock-step: every
/// committed operation leaves them equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Owning account.
    pub account_id: AccountId,
    /// Nominal balance after the last operation.
    pub book_balance: Decimal,
    /// Spendable balance used for sufficiency checks.
    pub available_balance: Decimal,
    /// Whether the balance may take part in movements.
    pub active: bool,
    /// When the balance was provisioned.
    pub created_at: DateTime<Utc>,
    /// When the balance was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    /// Create a new zero balance.
    pub fn zero(account_id: AccountId) -> Self {
        let now = Utc::now();
        Self {
            account_id,
            book_balance: to_scale(Decimal::ZERO),
            available_balance: to_scale(Decimal::ZERO),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if account has sufficient funds for a debit.
    pub fn has_sufficient_funds(&self, amount: Decimal) -> bool {
        self.available_balance >= amount
    }

    /// Add `amount` to both balances.
    ///
    /// Fails without touching the balance if the result would exceed
    /// [`MAX_AMOUNT`].
    pub fn credit(&mut self, amount: Decimal) -> Result<()> {
        let limit = LedgerError::BalanceLimitExceeded(self.account_id);
        let available = self.available_balance.checked_add(amount).ok_or(limit.clone())?;
        let book = self.book_balance.checked_add(amount).ok_or(limit.clone())?;
        if available > MAX_AMOUNT || book > MAX_AMOUNT {
            return Err(limit);
        }

        self.available_balance = to_scale(available);
        self.book_balance = to_scale(book);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Subtract `amount` from both balances.
    pub fn debit(&mut self, amount: Decimal) -> Result<()> {
        if !self.has_sufficient_funds(amount) {
            return Err(LedgerError::InsufficientFunds);
        }
        let available = self
            .available_balance
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientFunds)?;
        let book = self
            .book_balance
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientFunds)?;

        self.available_balance = to_scale(available);
        self.book_balance = to_scale(book);
        self.updated_at = Utc::now();
        Ok(())
    }
}
