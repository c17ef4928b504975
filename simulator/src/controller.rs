//! Simulation controller.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{info, warn};

use wallet_common::{AccountId, LedgerError};
use wallet_ledger::{LedgerConfig, LedgerEngine, MemoryStore, MetricsSnapshot, Transaction};

use crate::metrics::SimulationMetrics;
use crate::scenario::Scenario;
use crate::wallet::{SimulatedWallet, WalletFactory};

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub scenario: Scenario,
    pub elapsed: Duration,
    pub metrics: SimulationMetrics,
    pub ledger: MetricsSnapshot,
    pub total_balance: Decimal,
}

/// Controls the simulation.
pub struct SimulationController {
    /// Number of wallets.
    wallet_count: usize,
    /// Opening balance of every wallet.
    initial_balance: Decimal,
    /// Random number generator.
    rng: StdRng,
    /// Store behind the engine, kept for invariant checks.
    store: MemoryStore,
    /// Engine under test.
    engine: Arc<LedgerEngine>,
    /// Simulated wallets.
    wallets: Vec<Arc<SimulatedWallet>>,
    /// Money that should exist in the ledger right now.
    expected_total: Decimal,
    /// Simulation metrics.
    metrics: Arc<RwLock<SimulationMetrics>>,
}

impl SimulationController {
    /// Create a new simulation controller.
    pub fn new(wallet_count: usize, seed: Option<u64>, config: LedgerConfig) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let store = MemoryStore::with_lock_config(config.lock.clone());
        let engine = Arc::new(LedgerEngine::new(Arc::new(store.clone()), config));

        Self {
            wallet_count,
            initial_balance: Decimal::new(1_000_00, 2),
            rng,
            store,
            engine,
            wallets: Vec::new(),
            expected_total: Decimal::ZERO,
            metrics: Arc::new(RwLock::new(SimulationMetrics::new())),
        }
    }

    /// Open and fund the simulated wallets.
    pub async fn initialize(&mut self) -> anyhow::Result<()> {
        info!("Initializing simulation with {} wallets", self.wallet_count);

        for wallet in WalletFactory::create_wallets(self.wallet_count) {
            self.engine.open_account(wallet.id).await?;
            self.engine.deposit(wallet.id, self.initial_balance).await?;
            self.expected_total += self.initial_balance;
            info!("Opened wallet {} ({}) with {}", wallet.name, wallet.id, self.initial_balance);
            self.wallets.push(Arc::new(wallet));
        }

        Ok(())
    }

    /// Run a scenario and verify the ledger afterwards.
    pub async fn run_scenario(
        &mut self,
        scenario: Scenario,
        operations: usize,
    ) -> anyhow::Result<SimulationReport> {
        info!("Running scenario: {} - {}", scenario.name(), scenario.description());
        let start = Instant::now();

        match scenario {
            Scenario::Contention => self.contention(operations).await?,
            Scenario::ReverseTransfers => self.reverse_transfers(operations).await?,
            Scenario::RandomTransfers => self.random_transfers(operations).await?,
            Scenario::Walkthrough => self.walkthrough().await?,
        }

        let elapsed = start.elapsed();
        self.verify().await?;

        Ok(SimulationReport {
            scenario,
            elapsed,
            metrics: self.metrics.read().await.clone(),
            ledger: self.engine.metrics().snapshot(),
            total_balance: self.store.total_available(),
        })
    }

    /// Simulated wallets.
    pub fn wallets(&self) -> &[Arc<SimulatedWallet>] {
        &self.wallets
    }

    async fn contention(&mut self, operations: usize) -> anyhow::Result<()> {
        let target = self.wallet(0)?.id;
        let amount = Decimal::ONE;
        let before = self.engine.balance(target).await?.available_balance;

        let tasks = (0..operations).map(|_| {
            let engine = Arc::clone(&self.engine);
            async move { engine.deposit(target, amount).await }
        });
        let committed = self.run_concurrently(tasks).await;
        self.expected_total += amount * Decimal::from(committed);

        let after = self.engine.balance(target).await?.available_balance;
        let expected = before + amount * Decimal::from(committed);
        if after != expected {
            anyhow::bail!("Lost deposits: balance {} but expected {}", after, expected);
        }
        Ok(())
    }

    async fn reverse_transfers(&mut self, operations: usize) -> anyhow::Result<()> {
        let a = Arc::clone(self.wallet(0)?);
        let b = Arc::clone(self.wallet(1)?);
        let amount = Decimal::new(1_00, 2);

        let tasks = (0..operations).map(|i| {
            let engine = Arc::clone(&self.engine);
            let (from, to) = if i % 2 == 0 {
                (Arc::clone(&a), Arc::clone(&b))
            } else {
                (Arc::clone(&b), Arc::clone(&a))
            };
            async move { transfer(&engine, &from, &to, amount).await }
        });

        // A lock-order deadlock would hang here, so bound the wait.
        let deadline = Duration::from_secs(60);
        match tokio::time::timeout(deadline, self.run_concurrently(tasks)).await {
            Ok(_) => Ok(()),
            Err(_) => anyhow::bail!("Opposite transfers did not finish within {:?}", deadline),
        }
    }

    async fn random_transfers(&mut self, operations: usize) -> anyhow::Result<()> {
        if self.wallets.len() < 2 {
            anyhow::bail!("Random transfers need at least 2 wallets");
        }

        let mut plan = Vec::with_capacity(operations);
        for _ in 0..operations {
            let from = self.rng.gen_range(0..self.wallets.len());
            let mut to = self.rng.gen_range(0..self.wallets.len());
            while to == from {
                to = self.rng.gen_range(0..self.wallets.len());
            }
            let amount = Decimal::new(self.rng.gen_range(1..=50_000), 2);
            plan.push((from, to, amount));
        }

        let tasks = plan.into_iter().map(|(from, to, amount)| {
            let engine = Arc::clone(&self.engine);
            let from = Arc::clone(&self.wallets[from]);
            let to = Arc::clone(&self.wallets[to]);
            async move { transfer(&engine, &from, &to, amount).await }
        });
        self.run_concurrently(tasks).await;
        Ok(())
    }

    async fn walkthrough(&mut self) -> anyhow::Result<()> {
        let sender = AccountId::new();
        let recipient = AccountId::new();
        self.engine.open_account(sender).await?;
        self.engine.open_account(recipient).await?;

        let records = vec![
            self.engine.deposit(sender, Decimal::from(100)).await?,
            self.engine.deposit(sender, Decimal::from(100)).await?,
            self.engine.withdraw(sender, Decimal::from(10)).await?,
            self.engine.p2p_transfer(sender, recipient, Decimal::from(70)).await?,
        ];
        for record in &records {
            info!(
                reference = %record.reference,
                new_balance = %record.new_balance,
                "Walkthrough step committed"
            );
            self.metrics.write().await.record_success(Duration::ZERO);
        }
        self.expected_total += Decimal::from(190);

        let sender_balance = self.engine.balance(sender).await?.available_balance;
        let recipient_balance = self.engine.balance(recipient).await?.available_balance;
        if sender_balance != Decimal::from(120) || recipient_balance != Decimal::from(70) {
            anyhow::bail!(
                "Walkthrough ended with sender {} and recipient {}, expected 120 and 70",
                sender_balance,
                recipient_balance
            );
        }

        match records.last() {
            Some(last) if last.new_balance == Decimal::from(120) => Ok(()),
            _ => anyhow::bail!("Transfer record does not carry the sender's new balance"),
        }
    }

    /// Run all `tasks` at once and record their outcomes.
    ///
    /// Returns the number of committed operations.
    async fn run_concurrently<I, F>(&self, tasks: I) -> u64
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<Transaction, LedgerError>> + Send + 'static,
    {
        let handles: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let metrics = Arc::clone(&self.metrics);
                tokio::spawn(async move {
                    let start = Instant::now();
                    let result = task.await;
                    let mut metrics = metrics.write().await;
                    match &result {
                        Ok(_) => metrics.record_success(start.elapsed()),
                        Err(e) if e.is_validation() => metrics.record_rejection(),
                        Err(e) => {
                            warn!(error = %e, "Operation failed");
                            metrics.record_failure();
                        }
                    }
                    result.is_ok()
                })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .filter(|joined| matches!(joined, Ok(true)))
            .count() as u64
    }

    /// Check conservation and balance invariants.
    async fn verify(&self) -> anyhow::Result<()> {
        let total = self.store.total_available();
        if total != self.expected_total {
            anyhow::bail!(
                "Money not conserved: ledger holds {} but expected {}",
                total,
                self.expected_total
            );
        }

        for wallet in &self.wallets {
            let balance = self.engine.balance(wallet.id).await?;
            if balance.available_balance < Decimal::ZERO {
                anyhow::bail!("Wallet {} went negative: {}", wallet.name, balance.available_balance);
            }
            if balance.available_balance != balance.book_balance {
                anyhow::bail!("Wallet {} book and available balances diverged", wallet.name);
            }
        }

        let held = self.store.lock_manager().held_count();
        if held != 0 {
            anyhow::bail!("{} row locks still held after the run", held);
        }

        info!(total = %total, "Ledger invariants hold");
        Ok(())
    }

    fn wallet(&self, index: usize) -> anyhow::Result<&Arc<SimulatedWallet>> {
        self.wallets
            .get(index)
            .ok_or_else(|| anyhow::anyhow!("Scenario needs at least {} wallets", index + 1))
    }
}

async fn transfer(
    engine: &LedgerEngine,
    from: &SimulatedWallet,
    to: &SimulatedWallet,
    amount: Decimal,
) -> Result<Transaction, LedgerError> {
    let record = engine.p2p_transfer(from.id, to.id, amount).await?;
    from.record_sent();
    to.record_received();
    Ok(record)
}
