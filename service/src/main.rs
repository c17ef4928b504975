//! Wallet admin CLI
//!
//! Runs ledger operations against PostgreSQL and prints the results as JSON.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallet_common::AccountId;
use wallet_ledger::{LedgerEngine, PostgresStore};
use wallet_service::{
    ApiError, DepositRequest, P2pTransferRequest, ServiceConfig, WalletService, WithdrawalRequest,
};

/// Wallet ledger CLI
#[derive(Parser, Debug)]
#[command(name = "wallet")]
#[command(about = "Operate the wallet ledger")]
struct Args {
    /// Database URL (overrides DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the ledger tables
    Migrate,
    /// Provision a zero balance for an account
    Open { account: AccountId },
    /// Credit an account
    Deposit { account: AccountId, amount: Decimal },
    /// Debit an account
    Withdraw { account: AccountId, amount: Decimal },
    /// Move money between two accounts
    Transfer {
        sender: AccountId,
        recipient: AccountId,
        amount: Decimal,
    },
    /// Show the balance of an account
    Balance { account: AccountId },
    /// List the transactions owned by an account
    History { account: AccountId },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ServiceConfig::from_env();
    if let Some(url) = args.database_url {
        config.database_url = url;
    }

    // Logs go to stderr so stdout stays machine readable.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let store = PostgresStore::connect(
        &config.database_url,
        config.max_connections,
        &config.ledger.lock,
    )
    .await?;

    let store = Arc::new(store);
    let engine = Arc::new(LedgerEngine::new(store.clone(), config.ledger.clone()));
    let service = WalletService::new(engine);

    // The operator acts as the owner of the account it names.
    let outcome = match args.command {
        Command::Migrate => store
            .init_schema()
            .await
            .map(|()| {
                info!("Ledger schema ready");
                serde_json::json!({ "status": "migrated" })
            })
            .map_err(ApiError::from),
        Command::Open { account } => service.open_account(account).await.map(json),
        Command::Deposit { account, amount } => service
            .deposit(account, DepositRequest { account_id: account, amount })
            .await
            .map(json),
        Command::Withdraw { account, amount } => service
            .withdraw(account, WithdrawalRequest { account_id: account, amount })
            .await
            .map(json),
        Command::Transfer {
            sender,
            recipient,
            amount,
        } => service
            .p2p_transfer(
                sender,
                P2pTransferRequest {
                    sender_account_id: sender,
                    recipient_account_id: recipient,
                    amount,
                },
            )
            .await
            .map(json),
        Command::Balance { account } => service.balance(account, account).await.map(json),
        Command::History { account } => {
            service.list_transactions(account, account).await.map(json)
        }
    };

    match outcome {
        Ok(value) => emit(&value),
        Err(e) => {
            report(&e)?;
            std::process::exit(exit_code(&e));
        }
    }
}

fn json<T: Serialize>(value: T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

fn emit<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report(err: &ApiError) -> anyhow::Result<()> {
    error!(status = err.status, code = err.code, "Request failed");
    emit(&serde_json::json!({ "error": err }))
}

fn exit_code(err: &ApiError) -> i32 {
    match err.status {
        400..=499 => 2,
        _ => 1,
    }
}
