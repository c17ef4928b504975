//! Transaction records for the append-only transaction log.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use wallet_common::{AccountId, BankAccountId, LedgerError, TransactionId};

/// Kind of monetary movement, with the fields specific to each kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionKind {
    /// Money entering the wallet.
    Deposit,
    /// Money leaving the wallet.
    Withdrawal,
    /// Money moved between two wallets. The sender owns the record.
    P2pTransfer {
        sender: AccountId,
        recipient: AccountId,
    },
    /// Money paid out to an external bank account.
    BankTransfer { bank_account: BankAccountId },
}

impl TransactionKind {
    /// Storage tag.
    pub fn tag(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::P2pTransfer { .. } => "p2p_transfer",
            TransactionKind::BankTransfer { .. } => "bank_transfer",
        }
    }

    /// Record name used as the reference prefix.
    pub fn record_name(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "Deposit",
            TransactionKind::Withdrawal => "Withdrawal",
            TransactionKind::P2pTransfer { .. } => "P2PTransfer",
            TransactionKind::BankTransfer { .. } => "BankTransfer",
        }
    }

    /// Name shown to callers as `transaction_type`.
    pub fn display_name(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::P2pTransfer { .. } => "p2p transfer",
            TransactionKind::BankTransfer { .. } => "bank transfer",
        }
    }
}

/// Transaction status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Complete,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Complete => "complete",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "complete" => Ok(TransactionStatus::Complete),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(LedgerError::Internal(format!(
                "unknown transaction status: {}",
                other
            ))),
        }
    }
}

/// An immutable record of one committed monetary movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID.
    pub id: TransactionId,
    /// Human-readable unique reference, prefixed by the kind.
    pub reference: String,
    /// Account the record belongs to.
    pub owner: AccountId,
    /// Movement kind and kind-specific fields.
    #[serde(flatten)]
    pub kind: TransactionKind,
    /// Status.
    pub status: TransactionStatus,
    /// Amount moved (positive).
    pub amount: Decimal,
    /// Owner's available balance right after the movement.
    pub new_balance: Decimal,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a completed transaction record.
    pub fn complete(
        reference: String,
        owner: AccountId,
        kind: TransactionKind,
        amount: Decimal,
        new_balance: Decimal,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            reference,
            owner,
            kind,
            status: TransactionStatus::Complete,
            amount,
            new_balance,
            created_at: Utc::now(),
        }
    }
}
