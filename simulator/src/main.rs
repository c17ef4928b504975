//! Wallet Ledger Simulator
//!
//! Drives the ledger engine with concurrent load and checks that no money
//! is created or lost along the way.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallet_ledger::LedgerConfig;

mod controller;
mod metrics;
mod scenario;
mod wallet;

use controller::SimulationController;
use scenario::Scenario;

/// Wallet Ledger Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "Wallet ledger load and contention simulator")]
struct Args {
    /// Scenario to run (contention, reverse-transfers, random-transfers, walkthrough)
    #[arg(short, long, default_value = "random-transfers")]
    scenario: String,

    /// Number of simulated wallets to create
    #[arg(short, long, default_value = "8")]
    wallets: usize,

    /// Number of operations to run concurrently
    #[arg(short, long, default_value = "1000")]
    operations: usize,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let scenario = Scenario::load(&args.scenario)?;

    let config = LedgerConfig::from_env();
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    info!("Starting Wallet Ledger Simulator");
    info!("Wallets: {}", args.wallets);
    info!("Operations: {}", args.operations);

    let mut controller = SimulationController::new(args.wallets, args.seed, config);
    controller.initialize().await?;

    let report = match controller.run_scenario(scenario, args.operations).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, scenario = scenario.name(), "Simulation failed");
            return Err(e);
        }
    };

    let metrics = &report.metrics;
    info!("Simulation complete: {}", report.scenario.name());
    info!("Total operations: {}", metrics.total_operations);
    info!("Committed: {}", metrics.successful_operations);
    info!("Rejected: {}", metrics.rejected_operations);
    info!("Failed: {}", metrics.failed_operations);
    info!("Success rate: {:.1}%", metrics.success_rate() * 100.0);
    info!("Throughput: {:.0} ops/s", metrics.throughput(report.elapsed));
    info!(
        "Latency: avg {}us, p50 {}us, p99 {}us",
        metrics.average_latency_us(),
        metrics.p50_latency_us(),
        metrics.p99_latency_us()
    );
    info!(
        "Lock timeouts: {}, retries: {}",
        report.ledger.lock_timeouts, report.ledger.lock_retries
    );
    info!("Ledger total: {}", report.total_balance);
    for wallet in controller.wallets() {
        info!(
            "Wallet {}: sent {}, received {}",
            wallet.name,
            wallet.sent_count(),
            wallet.received_count()
        );
    }

    Ok(())
}
