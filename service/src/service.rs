//! Owner-scoped wallet operations.

use std::sync::Arc;

use tracing::{instrument, warn};

use wallet_common::{AccountId, LedgerError, TransactionId};
use wallet_ledger::{Balance, LedgerEngine};

use crate::api::{
    ApiError, DepositRequest, P2pTransferRequest, Receipt, TransactionView, WithdrawalRequest,
};

/// Result type of service calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Wallet service facade.
///
/// `caller` is the authenticated account making the request. Every call is
/// restricted to the caller's own account.
pub struct WalletService {
    engine: Arc<LedgerEngine>,
}

impl WalletService {
    /// Create a new service over `engine`.
    pub fn new(engine: Arc<LedgerEngine>) -> Self {
        Self { engine }
    }

    /// Provision a zero balance for a newly created account.
    pub async fn open_account(&self, account_id: AccountId) -> ApiResult<Balance> {
        Ok(self.engine.open_account(account_id).await?)
    }

    #[instrument(skip(self, request), fields(account = %request.account_id))]
    pub async fn deposit(&self, caller: AccountId, request: DepositRequest) -> ApiResult<Receipt> {
        authorize(caller, request.account_id)?;
        let record = self.engine.deposit(request.account_id, request.amount).await?;
        Ok(Receipt::from_transaction(&record))
    }

    #[instrument(skip(self, request), fields(account = %request.account_id))]
    pub async fn withdraw(
        &self,
        caller: AccountId,
        request: WithdrawalRequest,
    ) -> ApiResult<Receipt> {
        authorize(caller, request.account_id)?;
        let record = self.engine.withdraw(request.account_id, request.amount).await?;
        Ok(Receipt::from_transaction(&record))
    }

    #[instrument(skip(self, request), fields(sender = %request.sender_account_id))]
    pub async fn p2p_transfer(
        &self,
        caller: AccountId,
        request: P2pTransferRequest,
    ) -> ApiResult<Receipt> {
        authorize(caller, request.sender_account_id)?;
        let record = self
            .engine
            .p2p_transfer(
                request.sender_account_id,
                request.recipient_account_id,
                request.amount,
            )
            .await?;
        Ok(Receipt::from_transaction(&record))
    }

    /// Current balance of the caller's account.
    pub async fn balance(&self, caller: AccountId, account_id: AccountId) -> ApiResult<Balance> {
        authorize(caller, account_id)?;
        Ok(self.engine.balance(account_id).await?)
    }

    /// Transaction history of the caller's account, oldest first.
    pub async fn list_transactions(
        &self,
        caller: AccountId,
        account_id: AccountId,
    ) -> ApiResult<Vec<TransactionView>> {
        authorize(caller, account_id)?;
        let records = self.engine.transactions(account_id).await?;
        Ok(records.into_iter().map(TransactionView::from).collect())
    }

    /// One transaction of the caller's history.
    ///
    /// Records owned by another account are reported as not found.
    pub async fn get_transaction(
        &self,
        caller: AccountId,
        transaction_id: TransactionId,
    ) -> ApiResult<TransactionView> {
        let record = self.engine.transaction(transaction_id).await?;
        if record.owner != caller {
            return Err(LedgerError::TransactionNotFound(transaction_id).into());
        }
        Ok(record.into())
    }
}

fn authorize(caller: AccountId, account_id: AccountId) -> ApiResult<()> {
    if caller != account_id {
        warn!(caller = %caller, account = %account_id, "Caller does not own account");
        return Err(ApiError::permission_denied());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use wallet_ledger::{LedgerConfig, MemoryStore};

    async fn create_test_service() -> (WalletService, AccountId, AccountId) {
        let engine = LedgerEngine::new(Arc::new(MemoryStore::new()), LedgerConfig::default());
        let service = WalletService::new(Arc::new(engine));

        let alice = AccountId::new();
        let bob = AccountId::new();
        service.open_account(alice).await.unwrap();
        service.open_account(bob).await.unwrap();
        (service, alice, bob)
    }

    fn deposit(account_id: AccountId, amount: Decimal) -> DepositRequest {
        DepositRequest { account_id, amount }
    }

    #[tokio::test]
    async fn test_deposit_receipt() {
        let (service, alice, _) = create_test_service().await;

        let receipt = service.deposit(alice, deposit(alice, dec!(100))).await.unwrap();
        assert_eq!(receipt.status_code, 201);
        assert_eq!(receipt.status.as_str(), "complete");
        assert_eq!(receipt.amount, dec!(100));
        assert_eq!(receipt.transaction_type, "deposit");
    }

    #[tokio::test]
    async fn test_invalid_deposit_message() {
        let (service, alice, _) = create_test_service().await;

        let err = service.deposit(alice, deposit(alice, dec!(0))).await.unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(err.message, "Deposit amount must be greater than 0");
    }

    #[tokio::test]
    async fn test_withdrawal_insufficient_funds() {
        let (service, alice, _) = create_test_service().await;
        service.deposit(alice, deposit(alice, dec!(5))).await.unwrap();

        let request = WithdrawalRequest {
            account_id: alice,
            amount: dec!(6),
        };
        let err = service.withdraw(alice, request).await.unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(err.message, "insufficient funds");

        let request = WithdrawalRequest {
            account_id: alice,
            amount: dec!(5),
        };
        let receipt = service.withdraw(alice, request).await.unwrap();
        assert_eq!(receipt.transaction_type, "withdrawal");
    }

    #[tokio::test]
    async fn test_transfer_requires_sender_to_be_caller() {
        let (service, alice, bob) = create_test_service().await;
        service.deposit(alice, deposit(alice, dec!(50))).await.unwrap();

        let request = P2pTransferRequest {
            sender_account_id: alice,
            recipient_account_id: bob,
            amount: dec!(10),
        };
        let err = service.p2p_transfer(bob, request.clone()).await.unwrap_err();
        assert_eq!(err.status, 403);

        let receipt = service.p2p_transfer(alice, request).await.unwrap();
        assert_eq!(receipt.transaction_type, "p2p transfer");
        assert_eq!(service.balance(bob, bob).await.unwrap().available_balance, dec!(10));
    }

    #[tokio::test]
    async fn test_self_transfer_message() {
        let (service, alice, _) = create_test_service().await;
        service.deposit(alice, deposit(alice, dec!(50))).await.unwrap();

        let request = P2pTransferRequest {
            sender_account_id: alice,
            recipient_account_id: alice,
            amount: dec!(10),
        };
        let err = service.p2p_transfer(alice, request).await.unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(err.message, "You cannot make p2p transfer to yourself");
    }

    #[tokio::test]
    async fn test_cannot_act_on_other_accounts() {
        let (service, alice, bob) = create_test_service().await;

        assert_eq!(
            service.deposit(alice, deposit(bob, dec!(1))).await.unwrap_err().status,
            403
        );
        assert_eq!(service.balance(alice, bob).await.unwrap_err().status, 403);
        assert_eq!(service.list_transactions(alice, bob).await.unwrap_err().status, 403);
    }

    #[tokio::test]
    async fn test_transactions_are_owner_scoped() {
        let (service, alice, bob) = create_test_service().await;
        service.deposit(alice, deposit(alice, dec!(30))).await.unwrap();
        service.deposit(bob, deposit(bob, dec!(30))).await.unwrap();

        let history = service.list_transactions(alice, alice).await.unwrap();
        assert_eq!(history.len(), 1);
        let id = history[0].transaction.id;

        assert_eq!(service.get_transaction(alice, id).await.unwrap(), history[0]);
        assert_eq!(service.get_transaction(bob, id).await.unwrap_err().status, 404);
        assert_eq!(
            service.get_transaction(alice, TransactionId::new()).await.unwrap_err().status,
            404
        );
    }
}
