//! Ledger configuration.

use std::time::Duration;

/// Row lock configuration.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// How long an operation waits for a row lock before giving up.
    pub acquire_timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Ledger engine configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Lock configuration.
    pub lock: LockConfig,
    /// Extra attempts made after an operation hits a lock timeout.
    pub max_lock_retries: u32,
    /// Base delay between attempts; attempt `n` waits `n * retry_backoff`.
    pub retry_backoff: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock: LockConfig::default(),
            max_lock_retries: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(ms) = std::env::var("WALLET_LOCK_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.lock.acquire_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(retries) = std::env::var("WALLET_LOCK_RETRIES") {
            if let Ok(retries) = retries.parse() {
                config.max_lock_retries = retries;
            }
        }

        if let Ok(ms) = std::env::var("WALLET_RETRY_BACKOFF_MS") {
            if let Ok(ms) = ms.parse() {
                config.retry_backoff = Duration::from_millis(ms);
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.lock.acquire_timeout.is_zero() {
            return Err("Lock acquire timeout cannot be 0".to_string());
        }

        if self.max_lock_retries > 20 {
            return Err("Lock retries cannot exceed 20".to_string());
        }

        Ok(())
    }
}
