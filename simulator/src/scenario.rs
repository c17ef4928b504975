//! Simulation scenarios.

/// A simulation scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Many concurrent deposits into a single wallet.
    Contention,
    /// Concurrent transfers between two wallets in both directions.
    ReverseTransfers,
    /// Concurrent transfers between random wallet pairs.
    RandomTransfers,
    /// Deposit, withdrawal and transfer with known final balances.
    Walkthrough,
}

impl Scenario {
    /// Load a scenario by name.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "contention" => Ok(Self::Contention),
            "reverse-transfers" => Ok(Self::ReverseTransfers),
            "random-transfers" => Ok(Self::RandomTransfers),
            "walkthrough" => Ok(Self::Walkthrough),
            _ => Err(anyhow::anyhow!("Unknown scenario: {}", name)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Contention => "contention",
            Self::ReverseTransfers => "reverse-transfers",
            Self::RandomTransfers => "random-transfers",
            Self::Walkthrough => "walkthrough",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Contention => "Concurrent deposits racing for one balance row",
            Self::ReverseTransfers => "Opposite-direction transfers between two wallets",
            Self::RandomTransfers => "Random transfers across all wallets",
            Self::Walkthrough => "Deposit, withdraw and transfer with checked balances",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_by_name() {
        for scenario in [
            Scenario::Contention,
            Scenario::ReverseTransfers,
            Scenario::RandomTransfers,
            Scenario::Walkthrough,
        ] {
            assert_eq!(Scenario::load(scenario.name()).unwrap(), scenario);
        }
        assert!(Scenario::load("high-volume").is_err());
    }
}
