//! Simulated wallets.

use std::sync::atomic::{AtomicU64, Ordering};

use wallet_common::AccountId;

/// A wallet account driven by the simulator.
pub struct SimulatedWallet {
    /// Ledger account.
    pub id: AccountId,
    /// Display name used in logs.
    pub name: String,
    sent: AtomicU64,
    received: AtomicU64,
}

impl SimulatedWallet {
    /// Create a new simulated wallet with a fresh account id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: AccountId::new(),
            name: name.into(),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
        }
    }

    /// Record a committed outgoing transfer.
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a committed incoming transfer.
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Committed outgoing transfers.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Committed incoming transfers.
    pub fn received_count(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

/// Factory for simulated wallets.
pub struct WalletFactory;

impl WalletFactory {
    /// Create `count` wallets with readable names.
    pub fn create_wallets(count: usize) -> Vec<SimulatedWallet> {
        const NAMES: [&str; 8] = [
            "alice", "bob", "carol", "dave", "erin", "frank", "grace", "heidi",
        ];

        (0..count)
            .map(|i| match NAMES.get(i) {
                Some(name) => SimulatedWallet::new(*name),
                None => SimulatedWallet::new(format!("wallet-{}", i + 1)),
            })
            .collect()
    }
}
